//! Project-scoped memory records.
//!
//! Semantic records carry embeddings and tags; procedural entries are
//! semantic records tagged `procedure`. Episodic memory is a projection of
//! the chat history and lives in `chat_turns`.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::Result;

pub const PROCEDURE_TAG: &str = "procedure";

pub async fn insert_record(
	pool: &sqlx::PgPool,
	user_id: &str,
	project_id: &str,
	content: &str,
	embedding: Option<&str>,
	tags: &[String],
	created_at: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO memory_records (record_id, user_id, project_id, content, embedding, tags, created_at)
VALUES ($1, $2, $3, $4, $5::text::vector, $6, $7)",
	)
	.bind(Uuid::new_v4())
	.bind(user_id)
	.bind(project_id)
	.bind(content)
	.bind(embedding)
	.bind(tags)
	.bind(created_at)
	.execute(pool)
	.await?;

	Ok(())
}

/// Contents of the `top_k` records most similar to the query embedding.
/// Procedural records stay out of the results unless `include_procedures`
/// is set; audit entries must be asked for, never stumbled upon.
pub async fn semantic_contents(
	pool: &sqlx::PgPool,
	project_id: &str,
	embedding: &str,
	top_k: u32,
	include_procedures: bool,
) -> Result<Vec<String>> {
	let rows: Vec<(String,)> = sqlx::query_as(
		"\
SELECT content
FROM memory_records
WHERE project_id = $1
	AND embedding IS NOT NULL
	AND ($4 OR NOT ($5 = ANY(tags)))
ORDER BY embedding <=> $2::text::vector
LIMIT $3",
	)
	.bind(project_id)
	.bind(embedding)
	.bind(top_k as i64)
	.bind(include_procedures)
	.bind(PROCEDURE_TAG)
	.fetch_all(pool)
	.await?;

	Ok(rows.into_iter().map(|(content,)| content).collect())
}

/// The last `top_k` turns of a conversation, formatted `role: content` and
/// returned oldest-first.
pub async fn recent_turn_summaries(
	pool: &sqlx::PgPool,
	user_id: &str,
	project_id: &str,
	top_k: u32,
) -> Result<Vec<String>> {
	let rows: Vec<(String, String)> = sqlx::query_as(
		"\
SELECT role, content
FROM chat_turns
WHERE user_id = $1 AND project_id = $2
ORDER BY seq DESC
LIMIT $3",
	)
	.bind(user_id)
	.bind(project_id)
	.bind(top_k as i64)
	.fetch_all(pool)
	.await?;

	Ok(rows.into_iter().rev().map(|(role, content)| format!("{role}: {content}")).collect())
}

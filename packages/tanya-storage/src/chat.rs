//! Append-only chat history, keyed by (user_id, project_id).
//!
//! Concurrent requests against one conversation interleave in completion
//! order; each request appends exactly its own turns and never rewrites
//! existing rows.

use sqlx::{Executor, Postgres};

use crate::{Result, models::ChatTurnRow};

/// Append one user/assistant pair atomically: either both turns land or
/// neither does, so a conversation can never gain a dangling half-turn.
pub async fn append_turn_pair(
	pool: &sqlx::PgPool,
	user_turn: &ChatTurnRow,
	assistant_turn: &ChatTurnRow,
) -> Result<()> {
	let mut tx = pool.begin().await?;

	insert_turn(&mut *tx, user_turn).await?;
	insert_turn(&mut *tx, assistant_turn).await?;

	tx.commit().await?;

	Ok(())
}

async fn insert_turn<'e, E>(executor: E, turn: &ChatTurnRow) -> Result<()>
where
	E: Executor<'e, Database = Postgres>,
{
	sqlx::query(
		"\
INSERT INTO chat_turns (
	turn_id,
	user_id,
	project_id,
	role,
	content,
	sql_query,
	rag_documents,
	result_data,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
	)
	.bind(turn.turn_id)
	.bind(turn.user_id.as_str())
	.bind(turn.project_id.as_str())
	.bind(turn.role.as_str())
	.bind(turn.content.as_str())
	.bind(turn.sql_query.as_deref())
	.bind(turn.rag_documents.as_ref())
	.bind(turn.result_data.as_ref())
	.bind(turn.created_at)
	.execute(executor)
	.await?;

	Ok(())
}

/// The full conversation, oldest turn first.
pub async fn conversation_turns(
	pool: &sqlx::PgPool,
	user_id: &str,
	project_id: &str,
) -> Result<Vec<ChatTurnRow>> {
	let rows = sqlx::query_as::<_, ChatTurnRow>(
		"\
SELECT *
FROM chat_turns
WHERE user_id = $1 AND project_id = $2
ORDER BY seq",
	)
	.bind(user_id)
	.bind(project_id)
	.fetch_all(pool)
	.await?;

	Ok(rows)
}

//! Document corpora: schema descriptions and object-derived documents,
//! written by the external indexing pipeline and read here for retrieval.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::CandidateRow};

/// Which corpus a retrieval runs against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Corpus {
	/// Table and column descriptions that ground SQL synthesis.
	Schema,
	/// Object-derived documents (papers, uploaded files).
	Documents,
}
impl Corpus {
	pub fn source_types(self) -> &'static [&'static str] {
		match self {
			Self::Schema => &["table", "column"],
			Self::Documents => &["paper", "file"],
		}
	}
}

pub struct HybridQuery<'a> {
	pub project_id: &'a str,
	pub corpus: Corpus,
	/// Lexical leg input: the normalized question text.
	pub query_text: &'a str,
	/// Vector leg input as a pgvector literal.
	pub embedding: &'a str,
	/// Cosine floor for the vector leg. The lexical leg is not subject to
	/// it: eligibility is the union of the two legs, so a strong lexical hit
	/// qualifies even when its embedding is missing or dissimilar.
	pub min_vector_score: f32,
	pub candidate_k: u32,
}

pub async fn hybrid_candidates(
	pool: &sqlx::PgPool,
	query: HybridQuery<'_>,
) -> Result<Vec<CandidateRow>> {
	let source_types: Vec<String> =
		query.corpus.source_types().iter().map(|s| s.to_string()).collect();
	let rows = sqlx::query_as::<_, CandidateRow>(
		"\
WITH vector_leg AS (
	SELECT
		document_id,
		(1 - (embedding <=> $1::text::vector))::real AS vector_score
	FROM documents
	WHERE project_id = $2
		AND source_type = ANY($3)
		AND embedding IS NOT NULL
	ORDER BY embedding <=> $1::text::vector
	LIMIT $4
),
lexical_leg AS (
	SELECT
		document_id,
		ts_rank_cd(search_tsv, plainto_tsquery('simple', $5))::real AS lexical_score
	FROM documents
	WHERE project_id = $2
		AND source_type = ANY($3)
		AND search_tsv @@ plainto_tsquery('simple', $5)
	ORDER BY lexical_score DESC
	LIMIT $4
),
eligible AS (
	SELECT document_id FROM vector_leg WHERE vector_score >= $6
	UNION
	SELECT document_id FROM lexical_leg
)
SELECT
	d.document_id,
	d.text,
	d.source_type,
	COALESCE(v.vector_score, 0)::real AS vector_score,
	COALESCE(l.lexical_score, 0)::real AS lexical_score
FROM eligible e
JOIN documents d ON d.document_id = e.document_id
LEFT JOIN vector_leg v ON v.document_id = e.document_id
LEFT JOIN lexical_leg l ON l.document_id = e.document_id",
	)
	.bind(query.embedding)
	.bind(query.project_id)
	.bind(&source_types)
	.bind(query.candidate_k as i64)
	.bind(query.query_text)
	.bind(query.min_vector_score)
	.fetch_all(pool)
	.await?;

	Ok(rows)
}

/// Insert one document. The `text` stored is exactly the string that was
/// embedded; re-embedding the same text with the same model must reproduce
/// the vector.
#[allow(clippy::too_many_arguments)]
pub async fn insert_document(
	pool: &sqlx::PgPool,
	document_id: Uuid,
	project_id: &str,
	owner_ref: &str,
	source_type: &str,
	text: &str,
	embedding: Option<&str>,
	created_at: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO documents (document_id, project_id, owner_ref, source_type, text, embedding, created_at)
VALUES ($1, $2, $3, $4, $5, $6::text::vector, $7)",
	)
	.bind(document_id)
	.bind(project_id)
	.bind(owner_ref)
	.bind(source_type)
	.bind(text)
	.bind(embedding)
	.bind(created_at)
	.execute(pool)
	.await?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::Corpus;

	#[test]
	fn corpora_partition_the_source_types() {
		assert_eq!(Corpus::Schema.source_types(), &["table", "column"]);
		assert_eq!(Corpus::Documents.source_types(), &["paper", "file"]);
	}
}

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRow {
	pub document_id: Uuid,
	pub project_id: String,
	pub owner_ref: String,
	pub source_type: String,
	pub text: String,
	pub created_at: OffsetDateTime,
}

/// One hybrid-retrieval candidate as it leaves the database: raw leg scores,
/// not yet normalized or blended.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CandidateRow {
	pub document_id: Uuid,
	pub text: String,
	pub source_type: String,
	pub vector_score: f32,
	pub lexical_score: f32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatTurnRow {
	pub turn_id: Uuid,
	/// Append order within the whole log; assigned by the database. Turn
	/// pairs share a timestamp, so ordering relies on this, not on time.
	#[sqlx(default)]
	pub seq: i64,
	pub user_id: String,
	pub project_id: String,
	pub role: String,
	pub content: String,
	pub sql_query: Option<String>,
	pub rag_documents: Option<Value>,
	pub result_data: Option<Value>,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MemoryRecordRow {
	pub record_id: Uuid,
	pub user_id: String,
	pub project_id: String,
	pub content: String,
	pub tags: Vec<String>,
	pub created_at: OffsetDateTime,
}

/// Indexing jobs are owned by the external indexing pipeline; this crate
/// only ever reads them.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IndexingJobRow {
	pub job_id: Uuid,
	pub status: String,
	pub total_files: i32,
	pub processed_files: i32,
	pub successful_files: i32,
	pub failed_files: i32,
	pub total_documents: i32,
	pub processed_file_names: Value,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

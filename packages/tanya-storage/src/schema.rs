//! Embedded schema DDL.
//!
//! The vector dimension is fixed per deployment and rendered into the DDL at
//! startup; producer and consumer share the same dimension by construction.

const SCHEMA_SQL: &str = r#"
CREATE EXTENSION IF NOT EXISTS vector;

CREATE TABLE IF NOT EXISTS documents (
	document_id UUID PRIMARY KEY,
	project_id TEXT NOT NULL,
	owner_ref TEXT NOT NULL,
	source_type TEXT NOT NULL CHECK (source_type IN ('table', 'column', 'paper', 'file')),
	text TEXT NOT NULL,
	embedding vector(<VECTOR_DIM>),
	search_tsv TSVECTOR GENERATED ALWAYS AS (to_tsvector('simple'::regconfig, text)) STORED,
	created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS documents_project_source_idx
	ON documents (project_id, source_type);

CREATE INDEX IF NOT EXISTS documents_search_tsv_idx
	ON documents USING GIN (search_tsv);

CREATE TABLE IF NOT EXISTS chat_turns (
	turn_id UUID PRIMARY KEY,
	seq BIGINT GENERATED ALWAYS AS IDENTITY,
	user_id TEXT NOT NULL,
	project_id TEXT NOT NULL,
	role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
	content TEXT NOT NULL,
	sql_query TEXT,
	rag_documents JSONB,
	result_data JSONB,
	created_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS chat_turns_conversation_idx
	ON chat_turns (user_id, project_id, seq);

CREATE TABLE IF NOT EXISTS memory_records (
	record_id UUID PRIMARY KEY,
	user_id TEXT NOT NULL,
	project_id TEXT NOT NULL,
	content TEXT NOT NULL,
	embedding vector(<VECTOR_DIM>),
	tags TEXT[] NOT NULL DEFAULT '{}',
	created_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS memory_records_project_idx
	ON memory_records (project_id, user_id);

CREATE TABLE IF NOT EXISTS llm_cache (
	cache_id UUID PRIMARY KEY,
	cache_kind TEXT NOT NULL,
	cache_key TEXT NOT NULL,
	payload JSONB NOT NULL,
	created_at TIMESTAMPTZ NOT NULL,
	last_accessed_at TIMESTAMPTZ NOT NULL,
	expires_at TIMESTAMPTZ NOT NULL,
	hit_count BIGINT NOT NULL DEFAULT 0,
	UNIQUE (cache_kind, cache_key)
);

CREATE TABLE IF NOT EXISTS indexing_jobs (
	job_id UUID PRIMARY KEY,
	status TEXT NOT NULL CHECK (status IN ('pending', 'processing', 'paused', 'completed', 'failed', 'cancelled')),
	total_files INTEGER NOT NULL DEFAULT 0,
	processed_files INTEGER NOT NULL DEFAULT 0,
	successful_files INTEGER NOT NULL DEFAULT 0,
	failed_files INTEGER NOT NULL DEFAULT 0,
	total_documents INTEGER NOT NULL DEFAULT 0,
	processed_file_names JSONB NOT NULL DEFAULT '[]'::jsonb,
	created_at TIMESTAMPTZ NOT NULL,
	updated_at TIMESTAMPTZ NOT NULL
)
"#;

pub fn render_schema(vector_dim: u32) -> String {
	SCHEMA_SQL.replace("<VECTOR_DIM>", &vector_dim.to_string())
}

#[cfg(test)]
mod tests {
	use super::render_schema;

	#[test]
	fn renders_the_configured_dimension() {
		let sql = render_schema(3_072);

		assert!(sql.contains("vector(3072)"));
		assert!(!sql.contains("<VECTOR_DIM>"));
	}

	#[test]
	fn declares_every_table() {
		let sql = render_schema(8);

		for table in ["documents", "chat_turns", "memory_records", "llm_cache", "indexing_jobs"] {
			assert!(
				sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
				"missing table {table}"
			);
		}
	}
}

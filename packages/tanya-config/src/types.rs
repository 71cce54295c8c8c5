use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub retrieval: Retrieval,
	pub summarizer: Summarizer,
	pub memory: Memory,
	pub cache: Cache,
	pub security: Security,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	/// Embedding dimension of the document and memory corpora. Must match
	/// `providers.embedding.dimensions`; enforced at load time.
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: RerankProviderConfig,
	pub llm: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct RerankProviderConfig {
	pub enabled: bool,
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	/// Weight of the vector leg in the hybrid blend; the lexical leg gets
	/// `1 - alpha`.
	pub alpha: f32,
	pub min_cosine: f32,
	pub top_k: u32,
	pub candidate_k: u32,
	pub rerank_top_n: u32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self { alpha: 0.7, min_cosine: 0.25, top_k: 8, candidate_k: 40, rerank_top_n: 8 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Summarizer {
	pub max_rows: u32,
	pub max_snippets: u32,
	pub max_snippet_chars: u32,
	/// Character-to-token ratio used when the provider reports no usage.
	pub token_chars_per_token: f32,
}
impl Default for Summarizer {
	fn default() -> Self {
		Self { max_rows: 5, max_snippets: 5, max_snippet_chars: 1_200, token_chars_per_token: 4.0 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Memory {
	pub semantic_top_k: u32,
	pub episodic_top_k: u32,
	/// Whether `procedure`-tagged records may surface in semantic retrieval.
	pub include_procedures: bool,
}
impl Default for Memory {
	fn default() -> Self {
		Self { semantic_top_k: 5, episodic_top_k: 10, include_procedures: false }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub enabled: bool,
	pub embedding_ttl_days: i64,
	pub completion_ttl_days: i64,
	pub max_payload_bytes: Option<u64>,
}
impl Default for Cache {
	fn default() -> Self {
		Self {
			enabled: true,
			embedding_ttl_days: 30,
			completion_ttl_days: 7,
			max_payload_bytes: Some(262_144),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
	pub api_auth_token: Option<String>,
}

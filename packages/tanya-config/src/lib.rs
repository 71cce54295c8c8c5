mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, EmbeddingProviderConfig, LlmProviderConfig, Memory, Postgres, Providers,
	RerankProviderConfig, Retrieval, Security, Service, Storage, Summarizer,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.vector_dim.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.retrieval.alpha) {
		return Err(Error::Validation {
			message: "retrieval.alpha must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.retrieval.min_cosine) {
		return Err(Error::Validation {
			message: "retrieval.min_cosine must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !(1..=20).contains(&cfg.retrieval.top_k) {
		return Err(Error::Validation {
			message: "retrieval.top_k must be in the range 1-20.".to_string(),
		});
	}
	if cfg.retrieval.candidate_k < cfg.retrieval.top_k {
		return Err(Error::Validation {
			message: "retrieval.candidate_k must be at least retrieval.top_k.".to_string(),
		});
	}
	if cfg.summarizer.max_rows == 0 {
		return Err(Error::Validation {
			message: "summarizer.max_rows must be greater than zero.".to_string(),
		});
	}
	if cfg.summarizer.max_snippet_chars == 0 {
		return Err(Error::Validation {
			message: "summarizer.max_snippet_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.summarizer.token_chars_per_token <= 0.0
		|| !cfg.summarizer.token_chars_per_token.is_finite()
	{
		return Err(Error::Validation {
			message: "summarizer.token_chars_per_token must be a positive finite number."
				.to_string(),
		});
	}
	if cfg.cache.embedding_ttl_days <= 0 {
		return Err(Error::Validation {
			message: "cache.embedding_ttl_days must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.completion_ttl_days <= 0 {
		return Err(Error::Validation {
			message: "cache.completion_ttl_days must be greater than zero.".to_string(),
		});
	}

	if let Some(max) = cfg.cache.max_payload_bytes
		&& max == 0
	{
		return Err(Error::Validation {
			message: "cache.max_payload_bytes must be greater than zero.".to_string(),
		});
	}

	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider embedding api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.llm.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider llm api_key must be non-empty.".to_string(),
		});
	}
	// A disabled reranker may omit its credential; retrieval falls back to the
	// pre-rerank order either way.
	if cfg.providers.rerank.enabled && cfg.providers.rerank.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider rerank api_key must be non-empty when rerank is enabled."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.security
		.api_auth_token
		.as_deref()
		.map(|token| token.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.security.api_auth_token = None;
	}
}

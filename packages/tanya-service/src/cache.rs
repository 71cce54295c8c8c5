//! Content-addressed caching of provider calls.
//!
//! Keys hash the complete call input (provider, model, parameters, text), so
//! equal inputs hit and any drift in configuration misses. Cache failures
//! are never load-bearing: reads and writes degrade to a direct provider
//! call with a warning.

use serde_json::Value;
use time::{Duration, OffsetDateTime};

use tanya_providers::chat::ChatCompletion;
use tanya_storage::cache as cache_store;

use crate::{Error, Result, TanyaService};

const EMBEDDING_CACHE_KIND: &str = "embedding";
const COMPLETION_CACHE_KIND: &str = "completion";

pub(crate) fn hash_cache_key(payload: &Value) -> Result<String> {
	let raw = serde_json::to_vec(payload).map_err(|err| Error::Storage {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

pub(crate) fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	&key[..len]
}

pub(crate) fn build_embedding_cache_key(
	text: &str,
	provider_id: &str,
	model: &str,
	dimensions: u32,
) -> Result<String> {
	let payload = serde_json::json!({
		"kind": EMBEDDING_CACHE_KIND,
		"provider_id": provider_id,
		"model": model,
		"dimensions": dimensions,
		"text": text,
	});

	hash_cache_key(&payload)
}

pub(crate) fn build_completion_cache_key(
	kind: &str,
	provider_id: &str,
	model: &str,
	temperature: f32,
	messages: &[Value],
) -> Result<String> {
	let payload = serde_json::json!({
		"kind": COMPLETION_CACHE_KIND,
		"stage": kind,
		"provider_id": provider_id,
		"model": model,
		"temperature": temperature,
		"messages": messages,
	});

	hash_cache_key(&payload)
}

impl TanyaService {
	/// Embed one text, consulting the cache when enabled. The returned
	/// vector always matches the deployment dimension; a provider that
	/// disagrees is a hard error.
	pub(crate) async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let cache_cfg = &self.cfg.cache;
		let expected_dim = self.cfg.storage.vector_dim as usize;
		let now = OffsetDateTime::now_utc();
		let cache_key = if cache_cfg.enabled {
			match build_embedding_cache_key(text, &cfg.provider_id, &cfg.model, cfg.dimensions) {
				Ok(key) => Some(key),
				Err(err) => {
					tracing::warn!(error = %err, cache_kind = EMBEDDING_CACHE_KIND, "Cache key build failed.");

					None
				},
			}
		} else {
			None
		};

		if let Some(key) = cache_key.as_ref()
			&& let Some(vector) =
				self.fetch_cached_vector(key, expected_dim, now, cache_cfg.embedding_ttl_days).await
		{
			return Ok(vector);
		}

		let embeddings =
			self.providers.embedding.embed(cfg, std::slice::from_ref(&text.to_string())).await?;
		let Some(vector) = embeddings.into_iter().next() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != expected_dim {
			return Err(Error::Provider {
				message: format!(
					"Embedding vector has dimension {} but the deployment expects {expected_dim}.",
					vector.len()
				),
			});
		}

		if let Some(key) = cache_key {
			let payload = serde_json::json!({ "vector": &vector });

			self.store_cached_payload(
				EMBEDDING_CACHE_KIND,
				&key,
				payload,
				cache_cfg.embedding_ttl_days,
			)
			.await;
		}

		Ok(vector)
	}

	/// One chat completion, consulting the cache when enabled. Cached
	/// completions carry no provider usage; token accounting falls back to
	/// estimation for them.
	pub(crate) async fn complete_with_cache(
		&self,
		stage: &str,
		messages: &[Value],
	) -> Result<ChatCompletion> {
		let cfg = &self.cfg.providers.llm;
		let cache_cfg = &self.cfg.cache;
		let now = OffsetDateTime::now_utc();
		let cache_key = if cache_cfg.enabled {
			match build_completion_cache_key(
				stage,
				&cfg.provider_id,
				&cfg.model,
				cfg.temperature,
				messages,
			) {
				Ok(key) => Some(key),
				Err(err) => {
					tracing::warn!(error = %err, cache_kind = COMPLETION_CACHE_KIND, "Cache key build failed.");

					None
				},
			}
		} else {
			None
		};

		if let Some(key) = cache_key.as_ref() {
			match cache_store::fetch_payload(&self.db.pool, COMPLETION_CACHE_KIND, key, now).await {
				Ok(Some(payload)) => {
					tracing::info!(
						cache_kind = COMPLETION_CACHE_KIND,
						cache_key_prefix = cache_key_prefix(key),
						hit = true,
						payload_size = payload.size_bytes,
						"Cache hit."
					);

					if let Some(content) =
						payload.value.get("content").and_then(|value| value.as_str())
					{
						return Ok(ChatCompletion { content: content.to_string(), usage: None });
					}

					tracing::warn!(
						cache_kind = COMPLETION_CACHE_KIND,
						cache_key_prefix = cache_key_prefix(key),
						"Cache payload decode failed."
					);
				},
				Ok(None) => {
					tracing::info!(
						cache_kind = COMPLETION_CACHE_KIND,
						cache_key_prefix = cache_key_prefix(key),
						hit = false,
						"Cache miss."
					);
				},
				Err(err) => {
					tracing::warn!(
						error = %err,
						cache_kind = COMPLETION_CACHE_KIND,
						cache_key_prefix = cache_key_prefix(key),
						"Cache read failed."
					);
				},
			}
		}

		let completion = self.providers.chat.complete(cfg, messages).await?;

		if let Some(key) = cache_key {
			let payload = serde_json::json!({ "content": &completion.content });

			self.store_cached_payload(
				COMPLETION_CACHE_KIND,
				&key,
				payload,
				cache_cfg.completion_ttl_days,
			)
			.await;
		}

		Ok(completion)
	}

	async fn fetch_cached_vector(
		&self,
		key: &str,
		expected_dim: usize,
		now: OffsetDateTime,
		ttl_days: i64,
	) -> Option<Vec<f32>> {
		match cache_store::fetch_payload(&self.db.pool, EMBEDDING_CACHE_KIND, key, now).await {
			Ok(Some(payload)) => {
				tracing::info!(
					cache_kind = EMBEDDING_CACHE_KIND,
					cache_key_prefix = cache_key_prefix(key),
					hit = true,
					payload_size = payload.size_bytes,
					ttl_days,
					"Cache hit."
				);

				let vector: Option<Vec<f32>> = payload
					.value
					.get("vector")
					.cloned()
					.and_then(|value| serde_json::from_value(value).ok());

				match vector {
					Some(vector) if vector.len() == expected_dim => Some(vector),
					_ => {
						tracing::warn!(
							cache_kind = EMBEDDING_CACHE_KIND,
							cache_key_prefix = cache_key_prefix(key),
							"Cache payload decode failed."
						);

						None
					},
				}
			},
			Ok(None) => {
				tracing::info!(
					cache_kind = EMBEDDING_CACHE_KIND,
					cache_key_prefix = cache_key_prefix(key),
					hit = false,
					ttl_days,
					"Cache miss."
				);

				None
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = EMBEDDING_CACHE_KIND,
					cache_key_prefix = cache_key_prefix(key),
					"Cache read failed."
				);

				None
			},
		}
	}

	async fn store_cached_payload(&self, kind: &str, key: &str, payload: Value, ttl_days: i64) {
		let stored_at = OffsetDateTime::now_utc();
		let expires_at = stored_at + Duration::days(ttl_days);

		match cache_store::store_payload(
			&self.db.pool,
			kind,
			key,
			payload,
			stored_at,
			expires_at,
			self.cfg.cache.max_payload_bytes,
		)
		.await
		{
			Ok(Some(payload_size)) => {
				tracing::info!(
					cache_kind = kind,
					cache_key_prefix = cache_key_prefix(key),
					payload_size,
					ttl_days,
					"Cache stored."
				);
			},
			Ok(None) => {
				tracing::warn!(
					cache_kind = kind,
					cache_key_prefix = cache_key_prefix(key),
					ttl_days,
					"Cache payload skipped due to size."
				);
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = kind,
					cache_key_prefix = cache_key_prefix(key),
					"Cache write failed."
				);
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn embedding_keys_are_stable_for_equal_inputs() {
		let key_a = build_embedding_cache_key("rainfall", "openai", "embed-3", 3_072)
			.expect("Expected cache key.");
		let key_b = build_embedding_cache_key("rainfall", "openai", "embed-3", 3_072)
			.expect("Expected cache key.");

		assert_eq!(key_a, key_b);
	}

	#[test]
	fn embedding_keys_change_with_any_input() {
		let base = build_embedding_cache_key("rainfall", "openai", "embed-3", 3_072)
			.expect("Expected cache key.");

		for other in [
			build_embedding_cache_key("rainfall.", "openai", "embed-3", 3_072),
			build_embedding_cache_key("rainfall", "other", "embed-3", 3_072),
			build_embedding_cache_key("rainfall", "openai", "embed-4", 3_072),
			build_embedding_cache_key("rainfall", "openai", "embed-3", 1_536),
		] {
			assert_ne!(base, other.expect("Expected cache key."));
		}
	}

	#[test]
	fn completion_keys_cover_stage_and_messages() {
		let messages = vec![serde_json::json!({ "role": "user", "content": "hi" })];
		let key_a = build_completion_cache_key("sql", "llm", "model", 0.1, &messages)
			.expect("Expected cache key.");
		let key_b = build_completion_cache_key("summary", "llm", "model", 0.1, &messages)
			.expect("Expected cache key.");
		let other_messages = vec![serde_json::json!({ "role": "user", "content": "hello" })];
		let key_c = build_completion_cache_key("sql", "llm", "model", 0.1, &other_messages)
			.expect("Expected cache key.");

		assert_ne!(key_a, key_b);
		assert_ne!(key_a, key_c);
	}

	#[test]
	fn cache_key_prefix_is_stable() {
		assert_eq!(cache_key_prefix("abcd1234efgh5678"), "abcd1234efgh");
		assert_eq!(cache_key_prefix("short"), "short");
	}
}

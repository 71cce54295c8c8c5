//! Content-addressed provider-call cache with TTL.
//!
//! Keys are hashes of the full call input; concurrent writers race
//! last-writer-wins, which is safe because identical keys carry identical
//! payloads modulo provider nondeterminism.

use serde_json::Value;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::Result;

#[derive(Debug, Clone)]
pub struct CachePayload {
	pub value: Value,
	pub size_bytes: usize,
}

pub async fn fetch_payload(
	pool: &sqlx::PgPool,
	kind: &str,
	key: &str,
	now: OffsetDateTime,
) -> Result<Option<CachePayload>> {
	let row = sqlx::query(
		"SELECT payload FROM llm_cache WHERE cache_kind = $1 AND cache_key = $2 AND expires_at > $3",
	)
	.bind(kind)
	.bind(key)
	.bind(now)
	.fetch_optional(pool)
	.await?;
	let Some(row) = row else {
		return Ok(None);
	};

	let payload: Value = row.try_get("payload")?;
	let size_bytes = serde_json::to_vec(&payload).map(|bytes| bytes.len()).unwrap_or(0);

	sqlx::query(
		"UPDATE llm_cache \
         SET last_accessed_at = $1, hit_count = hit_count + 1 \
         WHERE cache_kind = $2 AND cache_key = $3",
	)
	.bind(now)
	.bind(kind)
	.bind(key)
	.execute(pool)
	.await?;

	Ok(Some(CachePayload { value: payload, size_bytes }))
}

/// Upsert one payload. Returns its encoded size, or `None` when the payload
/// exceeds `max_payload_bytes` and was skipped.
pub async fn store_payload(
	pool: &sqlx::PgPool,
	kind: &str,
	key: &str,
	payload: Value,
	now: OffsetDateTime,
	expires_at: OffsetDateTime,
	max_payload_bytes: Option<u64>,
) -> Result<Option<usize>> {
	let payload_size = serde_json::to_vec(&payload).map(|bytes| bytes.len()).unwrap_or(0);

	if let Some(max) = max_payload_bytes
		&& payload_size as u64 > max
	{
		return Ok(None);
	}

	sqlx::query(
		"INSERT INTO llm_cache \
         (cache_id, cache_kind, cache_key, payload, created_at, last_accessed_at, expires_at, hit_count) \
         VALUES ($1,$2,$3,$4,$5,$5,$6,0) \
         ON CONFLICT (cache_kind, cache_key) DO UPDATE SET \
         payload = EXCLUDED.payload, \
         last_accessed_at = EXCLUDED.last_accessed_at, \
         expires_at = EXCLUDED.expires_at, \
         hit_count = 0",
	)
	.bind(Uuid::new_v4())
	.bind(kind)
	.bind(key)
	.bind(payload)
	.bind(now)
	.bind(expires_at)
	.execute(pool)
	.await?;

	Ok(Some(payload_size))
}

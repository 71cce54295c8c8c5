// std
use std::time::Duration as StdDuration;

// crates.io
use color_eyre::{Result, eyre};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::warn;

/// Score assigned to a document whose scoring call failed. Low enough that a
/// failed document can never outrank a scored one.
const FAILED_SCORE: f32 = -1.0e9;

enum ScoreFailure {
	Auth,
	Other(color_eyre::Report),
}

/// Score each document against the query with one provider call per
/// document. A single document's failure yields a sentinel score and the
/// batch continues; an authentication failure short-circuits the remaining
/// documents with strictly decreasing sentinels, since the provider will
/// keep rejecting.
pub async fn score_documents(
	cfg: &tanya_config::RerankProviderConfig,
	query: &str,
	docs: &[String],
) -> Result<Vec<f32>> {
	let client = Client::builder().timeout(StdDuration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let mut scores = Vec::with_capacity(docs.len());
	let mut auth_failed = false;

	for (index, doc) in docs.iter().enumerate() {
		if auth_failed {
			scores.push(sentinel_score(index));

			continue;
		}

		match score_one(&client, cfg, &url, query, doc).await {
			Ok(score) => scores.push(score),
			Err(ScoreFailure::Auth) => {
				warn!(index, "Rerank authentication failed; skipping remaining documents.");

				auth_failed = true;

				scores.push(sentinel_score(index));
			},
			Err(ScoreFailure::Other(err)) => {
				warn!(index, error = %err, "Rerank scoring failed for one document.");

				scores.push(FAILED_SCORE);
			},
		}
	}

	Ok(scores)
}

fn sentinel_score(index: usize) -> f32 {
	FAILED_SCORE - index as f32
}

async fn score_one(
	client: &Client,
	cfg: &tanya_config::RerankProviderConfig,
	url: &str,
	query: &str,
	doc: &str,
) -> Result<f32, ScoreFailure> {
	let body = serde_json::json!({ "model": cfg.model, "query": query, "documents": [doc] });
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)
		.map_err(ScoreFailure::Other)?;
	let res = client
		.post(url)
		.headers(headers)
		.json(&body)
		.send()
		.await
		.map_err(|err| ScoreFailure::Other(err.into()))?;

	if matches!(res.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
		return Err(ScoreFailure::Auth);
	}

	let res = res.error_for_status().map_err(|err| ScoreFailure::Other(err.into()))?;
	let json: Value = res.json().await.map_err(|err| ScoreFailure::Other(err.into()))?;

	parse_single_score(json).map_err(ScoreFailure::Other)
}

fn parse_single_score(json: Value) -> Result<f32> {
	let results = json
		.get("results")
		.or_else(|| json.get("data"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| eyre::eyre!("Rerank response is missing results array."))?;
	let first = results.first().ok_or_else(|| eyre::eyre!("Rerank response has no results."))?;
	let score = first
		.get("relevance_score")
		.or_else(|| first.get("score"))
		.and_then(|v| v.as_f64())
		.ok_or_else(|| eyre::eyre!("Rerank result is missing its score."))?;

	Ok(score as f32)
}

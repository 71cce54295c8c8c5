use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

/// Token counts as reported by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProviderUsage {
	pub prompt_tokens: u32,
	pub completion_tokens: u32,
	pub total_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct ChatCompletion {
	pub content: String,
	pub usage: Option<ProviderUsage>,
}

/// One chat-completion round trip. The caller owns any JSON parsing of the
/// returned content and decides whether a malformed payload is fatal.
pub async fn complete(
	cfg: &tanya_config::LlmProviderConfig,
	messages: &[Value],
) -> Result<ChatCompletion> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_chat_response(json)
}

fn parse_chat_response(json: Value) -> Result<ChatCompletion> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| eyre::eyre!("Chat response is missing message content."))?
		.to_string();
	let usage = json.get("usage").and_then(parse_usage);

	Ok(ChatCompletion { content, usage })
}

fn parse_usage(usage: &Value) -> Option<ProviderUsage> {
	let prompt_tokens = usage.get("prompt_tokens")?.as_u64()? as u32;
	let completion_tokens = usage.get("completion_tokens")?.as_u64()? as u32;
	let total_tokens = usage
		.get("total_tokens")
		.and_then(|v| v.as_u64())
		.map(|v| v as u32)
		.unwrap_or(prompt_tokens + completion_tokens);

	Some(ProviderUsage { prompt_tokens, completion_tokens, total_tokens })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_content_and_usage() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "SELECT 1;" } }
			],
			"usage": { "prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128 }
		});
		let completion = parse_chat_response(json).expect("parse failed");

		assert_eq!(completion.content, "SELECT 1;");
		assert_eq!(
			completion.usage,
			Some(ProviderUsage { prompt_tokens: 120, completion_tokens: 8, total_tokens: 128 })
		);
	}

	#[test]
	fn usage_total_is_derived_when_absent() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "ok" } }
			],
			"usage": { "prompt_tokens": 10, "completion_tokens": 5 }
		});
		let completion = parse_chat_response(json).expect("parse failed");

		assert_eq!(completion.usage.expect("usage").total_tokens, 15);
	}

	#[test]
	fn missing_usage_is_tolerated() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "ok" } }
			]
		});
		let completion = parse_chat_response(json).expect("parse failed");

		assert!(completion.usage.is_none());
	}

	#[test]
	fn missing_content_is_an_error() {
		assert!(parse_chat_response(serde_json::json!({ "choices": [] })).is_err());
	}
}

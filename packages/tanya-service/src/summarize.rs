//! Conversational summarization with bounded prompts and token accounting.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

use tanya_providers::chat::ProviderUsage;

use crate::{Result, TanyaService};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageSource {
	/// Counts reported by the provider.
	Measured,
	/// Counts derived from a fixed character-to-token ratio.
	Estimated,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
	#[serde(rename = "promptTokens")]
	pub prompt_tokens: u32,
	#[serde(rename = "completionTokens")]
	pub completion_tokens: u32,
	#[serde(rename = "totalTokens")]
	pub total_tokens: u32,
	pub source: UsageSource,
}
impl TokenUsage {
	pub fn zero(source: UsageSource) -> Self {
		Self { prompt_tokens: 0, completion_tokens: 0, total_tokens: 0, source }
	}
}

#[derive(Clone, Debug)]
pub struct Summary {
	pub text: String,
	pub usage: TokenUsage,
}

impl TanyaService {
	/// Answer the question from SQL rows and/or context snippets, in
	/// `target_language` (detected from the raw user query, never the
	/// normalized one).
	///
	/// Rows and snippets are truncated to hard caps before the prompt is
	/// built. With no evidence at all, a canned answer is returned without
	/// spending a provider call.
	pub async fn summarize(
		&self,
		query: &str,
		rows: &[Value],
		snippets: &[String],
		target_language: &str,
	) -> Result<Summary> {
		let cfg = &self.cfg.summarizer;
		let rows = &rows[..rows.len().min(cfg.max_rows as usize)];
		let snippets: Vec<String> = snippets
			.iter()
			.take(cfg.max_snippets as usize)
			.map(|snippet| truncate_graphemes(snippet, cfg.max_snippet_chars as usize))
			.collect();

		if rows.is_empty() && snippets.is_empty() {
			return Ok(Summary {
				text: no_data_answer(target_language).to_string(),
				usage: TokenUsage::zero(UsageSource::Estimated),
			});
		}

		let messages = build_summary_messages(query, rows, &snippets, target_language);
		let completion = self.complete_with_cache("summary", &messages).await?;
		let usage = match completion.usage {
			Some(usage) => measured(usage),
			None => {
				estimate_usage(&messages, &completion.content, cfg.token_chars_per_token)
			},
		};

		Ok(Summary { text: completion.content.trim().to_string(), usage })
	}
}

fn build_summary_messages(
	query: &str,
	rows: &[Value],
	snippets: &[String],
	target_language: &str,
) -> Vec<Value> {
	let language_name = match target_language {
		"id" => "Indonesian",
		"en" => "English",
		other => other,
	};
	let system = format!(
		"You answer the user's question about their project data in two or three sentences, \
		 using only the evidence provided. Answer exclusively in {language_name}. Do not invent \
		 numbers; when the evidence is thin, say what is missing."
	);
	let mut evidence = String::new();

	if !rows.is_empty() {
		evidence.push_str("Rows:\n");
		evidence.push_str(&Value::Array(rows.to_vec()).to_string());
		evidence.push('\n');
	}
	for snippet in snippets {
		evidence.push_str("Context:\n");
		evidence.push_str(snippet);
		evidence.push('\n');
	}

	let user = format!("{evidence}\nQuestion: {query}");

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user }),
	]
}

fn measured(usage: ProviderUsage) -> TokenUsage {
	TokenUsage {
		prompt_tokens: usage.prompt_tokens,
		completion_tokens: usage.completion_tokens,
		total_tokens: usage.total_tokens,
		source: UsageSource::Measured,
	}
}

fn estimate_usage(messages: &[Value], completion: &str, chars_per_token: f32) -> TokenUsage {
	let prompt_chars: usize = messages
		.iter()
		.filter_map(|message| message.get("content").and_then(|content| content.as_str()))
		.map(|content| content.chars().count())
		.sum();
	let completion_chars = completion.chars().count();
	let estimate =
		|chars: usize| ((chars as f32 / chars_per_token).ceil()).max(0.0) as u32;
	let prompt_tokens = estimate(prompt_chars);
	let completion_tokens = estimate(completion_chars);

	TokenUsage {
		prompt_tokens,
		completion_tokens,
		total_tokens: prompt_tokens + completion_tokens,
		source: UsageSource::Estimated,
	}
}

/// Truncate to at most `max_chars` grapheme clusters, never splitting one.
pub(crate) fn truncate_graphemes(text: &str, max_chars: usize) -> String {
	if text.len() <= max_chars {
		return text.to_string();
	}

	text.graphemes(true).take(max_chars).collect()
}

pub(crate) fn no_data_answer(language: &str) -> &'static str {
	match language {
		"id" => "Maaf, tidak ada data yang ditemukan untuk pertanyaan ini.",
		_ => "No data was found for this question.",
	}
}

pub(crate) fn no_schema_answer(language: &str) -> &'static str {
	match language {
		"id" => "Tidak ada informasi skema yang relevan untuk pertanyaan ini.",
		_ => "No relevant schema information was found for this question.",
	}
}

pub(crate) fn unlocatable_answer(language: &str) -> &'static str {
	match language {
		"id" =>
			"Mohon sebutkan kabupaten, kota, atau provinsi agar pertanyaan dapat dijawab.",
		_ => "Please name a district, city, or province so the question can be answered.",
	}
}

pub(crate) fn stage_failure_answer(language: &str, detail: &str) -> String {
	match language {
		"id" => format!("Pertanyaan tidak dapat diproses: {detail}"),
		_ => format!("The question could not be processed: {detail}"),
	}
}

pub(crate) fn execution_failure_answer(language: &str, message: &str) -> String {
	match language {
		"id" => format!("Kueri gagal dijalankan: {message}"),
		_ => format!("The query failed to execute: {message}"),
	}
}

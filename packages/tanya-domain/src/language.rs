//! Answer-language selection.
//!
//! The response language is detected from the raw user question, never from
//! the normalized form (normalization injects English grammar markers that
//! would skew detection).

/// ISO 639-1 code of the language the answer must be written in.
///
/// Unconfident detections fall back to Indonesian, the deployment's primary
/// audience. Indonesian and Malay are close enough that whatlang frequently
/// labels one as the other; both map to `id`.
pub fn answer_language(query: &str) -> &'static str {
	let Some(info) = whatlang::detect(query) else {
		return "id";
	};

	if !info.is_reliable() {
		return "id";
	}

	match info.lang() {
		whatlang::Lang::Ind | whatlang::Lang::Jav => "id",
		whatlang::Lang::Eng => "en",
		_ => "id",
	}
}

//! Cross-encoder reranking with a defined identity fallback.

use uuid::Uuid;

use crate::TanyaService;

#[derive(Clone, Debug, PartialEq)]
pub struct RerankedDocument {
	pub id: Uuid,
	pub text: String,
	pub score: f32,
}

impl TanyaService {
	/// Rerank the first `min(top_n, docs)` documents against the query,
	/// sorted by descending score.
	///
	/// A disabled or credential-less reranker returns the input order with
	/// zero scores; a failing provider falls back to the same identity
	/// ordering. Reranking never fails the caller.
	pub async fn rerank(
		&self,
		query: &str,
		docs: &[(Uuid, String)],
		top_n: usize,
	) -> Vec<RerankedDocument> {
		let docs = &docs[..docs.len().min(top_n)];
		let cfg = &self.cfg.providers.rerank;

		if !cfg.enabled || cfg.api_key.trim().is_empty() {
			return identity_order(docs);
		}

		let texts: Vec<String> = docs.iter().map(|(_, text)| text.clone()).collect();

		match self.providers.rerank.score(cfg, query, &texts).await {
			Ok(scores) if scores.len() == docs.len() => {
				let mut out: Vec<RerankedDocument> = docs
					.iter()
					.zip(scores)
					.map(|((id, text), score)| RerankedDocument {
						id: *id,
						text: text.clone(),
						score,
					})
					.collect();

				// Stable sort: ties keep their pre-rerank order.
				out.sort_by(|a, b| {
					b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
				});

				out
			},
			Ok(scores) => {
				tracing::warn!(
					expected = docs.len(),
					returned = scores.len(),
					"Rerank returned a mismatched score count; keeping retrieval order."
				);

				identity_order(docs)
			},
			Err(err) => {
				tracing::warn!(error = %err, "Rerank failed; keeping retrieval order.");

				identity_order(docs)
			},
		}
	}
}

fn identity_order(docs: &[(Uuid, String)]) -> Vec<RerankedDocument> {
	docs.iter()
		.map(|(id, text)| RerankedDocument { id: *id, text: text.clone(), score: 0.0 })
		.collect()
}

//! Hybrid retrieval: dense vector similarity blended with lexical
//! full-text rank, then an optional rerank of the top slice.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tanya_storage::{
	documents::{self, Corpus, HybridQuery},
	models::CandidateRow,
	vector_literal,
};

use crate::{Result, TanyaService};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalCandidate {
	#[serde(rename = "documentId")]
	pub document_id: Uuid,
	pub text: String,
	#[serde(rename = "sourceType")]
	pub source_type: String,
	#[serde(rename = "vectorScore")]
	pub vector_score: f32,
	#[serde(rename = "lexicalScore")]
	pub lexical_score: f32,
	#[serde(rename = "combinedScore")]
	pub combined_score: f32,
	#[serde(rename = "rerankScore", default, skip_serializing_if = "Option::is_none")]
	pub rerank_score: Option<f32>,
}

#[derive(Clone, Copy, Debug)]
pub struct RetrievalParams {
	pub min_vector_score: f32,
	pub top_k: u32,
	pub alpha: f32,
}

impl TanyaService {
	/// Retrieve up to `top_k` candidates from one corpus, ranked by blended
	/// score. Raw leg scores are min-max rescaled over the candidate set
	/// before blending; raw vector and lexical scales are not comparable.
	pub async fn retrieve(
		&self,
		project_id: &str,
		query: &str,
		query_embedding: &[f32],
		corpus: Corpus,
		params: &RetrievalParams,
	) -> Result<Vec<RetrievalCandidate>> {
		let embedding = vector_literal(query_embedding);
		let rows = documents::hybrid_candidates(&self.db.pool, HybridQuery {
			project_id,
			corpus,
			query_text: query,
			embedding: &embedding,
			min_vector_score: params.min_vector_score,
			candidate_k: self.cfg.retrieval.candidate_k.max(params.top_k),
		})
		.await?;
		let mut candidates = blend_candidates(rows, params.alpha);

		candidates.truncate(params.top_k as usize);

		self.apply_rerank(query, &mut candidates).await;

		Ok(candidates)
	}

	async fn apply_rerank(&self, query: &str, candidates: &mut Vec<RetrievalCandidate>) {
		let top_n = (self.cfg.retrieval.rerank_top_n as usize).min(candidates.len());

		if top_n == 0 {
			return;
		}

		let docs: Vec<(Uuid, String)> = candidates[..top_n]
			.iter()
			.map(|candidate| (candidate.document_id, candidate.text.clone()))
			.collect();
		let reranked = self.rerank(query, &docs, top_n).await;
		let mut by_id: HashMap<Uuid, RetrievalCandidate> =
			candidates.drain(..top_n).map(|candidate| (candidate.document_id, candidate)).collect();
		let mut reordered = Vec::with_capacity(top_n);

		for doc in reranked {
			let Some(mut candidate) = by_id.remove(&doc.id) else {
				continue;
			};

			candidate.rerank_score = Some(doc.score);

			reordered.push(candidate);
		}

		// Anything the reranker did not hand back keeps a slot at the end of
		// the slice rather than disappearing.
		reordered.extend(by_id.into_values());

		for (index, candidate) in reordered.into_iter().enumerate() {
			candidates.insert(index, candidate);
		}
	}
}

/// Blend raw leg scores into the final pre-rerank ranking. Equal combined
/// scores order by ascending document id so results are stable across runs.
pub fn blend_candidates(rows: Vec<CandidateRow>, alpha: f32) -> Vec<RetrievalCandidate> {
	if rows.is_empty() {
		return Vec::new();
	}

	let (vector_min, vector_max) = score_range(rows.iter().map(|row| row.vector_score));
	let (lexical_min, lexical_max) = score_range(rows.iter().map(|row| row.lexical_score));
	let mut candidates: Vec<RetrievalCandidate> = rows
		.into_iter()
		.map(|row| {
			let vector_norm = rescale(row.vector_score, vector_min, vector_max);
			let lexical_norm = rescale(row.lexical_score, lexical_min, lexical_max);

			RetrievalCandidate {
				document_id: row.document_id,
				text: row.text,
				source_type: row.source_type,
				vector_score: row.vector_score,
				lexical_score: row.lexical_score,
				combined_score: alpha * vector_norm + (1.0 - alpha) * lexical_norm,
				rerank_score: None,
			}
		})
		.collect();

	candidates.sort_by(|a, b| {
		b.combined_score
			.partial_cmp(&a.combined_score)
			.unwrap_or(std::cmp::Ordering::Equal)
			.then_with(|| a.document_id.cmp(&b.document_id))
	});

	candidates
}

fn score_range(scores: impl Iterator<Item = f32>) -> (f32, f32) {
	let mut min = f32::INFINITY;
	let mut max = f32::NEG_INFINITY;

	for score in scores {
		min = min.min(score);
		max = max.max(score);
	}

	(min, max)
}

fn rescale(value: f32, min: f32, max: f32) -> f32 {
	if max > min {
		(value - min) / (max - min)
	} else if max > 0.0 {
		1.0
	} else {
		0.0
	}
}

#[cfg(test)]
mod tests {
	use uuid::Uuid;

	use super::*;

	fn row(id: u128, vector_score: f32, lexical_score: f32) -> CandidateRow {
		CandidateRow {
			document_id: Uuid::from_u128(id),
			text: format!("doc {id}"),
			source_type: "table".to_string(),
			vector_score,
			lexical_score,
		}
	}

	#[test]
	fn blend_orders_by_combined_score() {
		let candidates =
			blend_candidates(vec![row(1, 0.2, 0.9), row(2, 0.9, 0.1), row(3, 0.5, 0.5)], 0.5);

		assert_eq!(candidates.len(), 3);
		assert!(candidates[0].combined_score >= candidates[1].combined_score);
		assert!(candidates[1].combined_score >= candidates[2].combined_score);
	}

	#[test]
	fn raising_a_vector_score_never_lowers_the_combined_score() {
		let alpha = 0.6;
		let base = blend_candidates(vec![row(1, 0.4, 0.3), row(2, 0.8, 0.6)], alpha);
		let bumped = blend_candidates(vec![row(1, 0.6, 0.3), row(2, 0.8, 0.6)], alpha);
		let combined =
			|candidates: &[RetrievalCandidate]| {
				candidates
					.iter()
					.find(|candidate| candidate.document_id == Uuid::from_u128(1))
					.map(|candidate| candidate.combined_score)
					.expect("candidate 1 present")
			};

		assert!(combined(&bumped) >= combined(&base));
	}

	#[test]
	fn equal_scores_tie_break_by_document_id() {
		let candidates = blend_candidates(vec![row(7, 0.5, 0.5), row(3, 0.5, 0.5)], 0.5);

		assert_eq!(candidates[0].document_id, Uuid::from_u128(3));
		assert_eq!(candidates[1].document_id, Uuid::from_u128(7));
	}

	#[test]
	fn lexical_only_hit_survives_blending() {
		let candidates = blend_candidates(vec![row(1, 0.0, 0.8), row(2, 0.9, 0.0)], 0.7);

		assert_eq!(candidates.len(), 2);
		assert!(candidates.iter().any(|candidate| candidate.document_id == Uuid::from_u128(1)));
	}

	#[test]
	fn single_candidate_gets_full_normalized_scores() {
		let candidates = blend_candidates(vec![row(1, 0.8, 0.4)], 0.7);

		assert!((candidates[0].combined_score - 1.0).abs() < f32::EPSILON);
	}
}

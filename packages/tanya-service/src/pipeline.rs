//! The pipeline orchestrator.
//!
//! One request walks normalize → embed → retrieve → synthesize → execute →
//! summarize → persist, in that order, with conditional short-circuits:
//! no schema candidates ends the turn with a fixed answer, an empty
//! synthesis skips execution, and an execution failure becomes the turn's
//! content. Every path persists exactly one user turn and one assistant
//! turn and returns a well-formed response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use tanya_domain::{language, location::LocationOutcome};
use tanya_storage::{chat, documents::Corpus, models::ChatTurnRow, sandbox};

use crate::{
	Error, Result, RetrievalCandidate, RetrievalParams, TanyaService, TokenUsage, UsageSource,
	summarize,
};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AskRequest {
	pub query: String,
	#[serde(rename = "projectId")]
	pub project_id: String,
	#[serde(rename = "userId", default)]
	pub user_id: Option<String>,
	#[serde(default)]
	pub min_cosine: Option<f32>,
	#[serde(default)]
	pub top_k: Option<u32>,
	/// Districts of the project itself, used only when the question names
	/// no location of its own.
	#[serde(rename = "districtHints", default)]
	pub district_hints: Vec<String>,
	#[serde(rename = "chatHistory", default)]
	pub chat_history: Option<Vec<ChatTurn>>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatTurn {
	pub role: String,
	pub content: String,
	#[serde(with = "crate::time_serde")]
	pub timestamp: OffsetDateTime,
	#[serde(rename = "sqlQuery", default, skip_serializing_if = "Option::is_none")]
	pub sql_query: Option<String>,
	#[serde(rename = "ragDocuments", default, skip_serializing_if = "Option::is_none")]
	pub rag_documents: Option<Vec<RetrievalCandidate>>,
	#[serde(rename = "resultData", default, skip_serializing_if = "Option::is_none")]
	pub result_data: Option<Vec<Value>>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct SearchStats {
	#[serde(rename = "totalDocumentsFound")]
	pub total_documents_found: usize,
	#[serde(rename = "minCosineThreshold")]
	pub min_cosine_threshold: f32,
	#[serde(rename = "topK")]
	pub top_k: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AskResponse {
	pub success: bool,
	pub query: String,
	#[serde(rename = "sqlQuery")]
	pub sql_query: Option<String>,
	pub answer: String,
	pub data: Vec<Value>,
	#[serde(rename = "chatHistory")]
	pub chat_history: Vec<ChatTurn>,
	#[serde(rename = "relevantDocuments")]
	pub relevant_documents: Vec<RetrievalCandidate>,
	#[serde(rename = "searchStats")]
	pub search_stats: SearchStats,
}

/// What one pipeline run produced, before persistence.
struct TurnOutcome {
	success: bool,
	/// Terminal stage label, recorded in the procedural log.
	stage: &'static str,
	answer: String,
	sql_query: Option<String>,
	data: Vec<Value>,
	relevant_documents: Vec<RetrievalCandidate>,
	usage: TokenUsage,
}
impl TurnOutcome {
	fn terminal(stage: &'static str, answer: impl Into<String>) -> Self {
		Self {
			success: true,
			stage,
			answer: answer.into(),
			sql_query: None,
			data: Vec::new(),
			relevant_documents: Vec::new(),
			usage: TokenUsage::zero(UsageSource::Estimated),
		}
	}

	fn failed(stage: &'static str, answer: String) -> Self {
		Self { success: false, ..Self::terminal(stage, answer) }
	}
}

impl TanyaService {
	pub async fn ask(&self, req: AskRequest) -> Result<AskResponse> {
		let query = req.query.trim().to_string();
		let project_id = req.project_id.trim().to_string();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query is required.".to_string() });
		}
		if project_id.is_empty() {
			return Err(Error::InvalidRequest { message: "projectId is required.".to_string() });
		}

		let user_id = req
			.user_id
			.as_deref()
			.map(str::trim)
			.filter(|value| !value.is_empty())
			.unwrap_or("default")
			.to_string();
		let min_cosine = req.min_cosine.unwrap_or(self.cfg.retrieval.min_cosine);

		if !(0.0..=1.0).contains(&min_cosine) {
			return Err(Error::InvalidRequest {
				message: "min_cosine must be in the range 0.0-1.0.".to_string(),
			});
		}

		let top_k = req.top_k.unwrap_or(self.cfg.retrieval.top_k);

		if !(1..=20).contains(&top_k) {
			return Err(Error::InvalidRequest {
				message: "top_k must be in the range 1-20.".to_string(),
			});
		}

		// Answer language comes from the raw query; normalization injects
		// English grammar markers that would skew detection.
		let answer_language = language::answer_language(&query);
		let started = OffsetDateTime::now_utc();
		let outcome = self
			.run_pipeline(&query, &project_id, &req.district_hints, min_cosine, top_k, answer_language)
			.await?;

		let now = OffsetDateTime::now_utc();
		let user_turn = ChatTurn {
			role: "user".to_string(),
			content: query.clone(),
			timestamp: now,
			sql_query: None,
			rag_documents: None,
			result_data: None,
		};
		let assistant_turn = ChatTurn {
			role: "assistant".to_string(),
			content: outcome.answer.clone(),
			timestamp: now,
			sql_query: outcome.sql_query.clone(),
			rag_documents: (!outcome.relevant_documents.is_empty())
				.then(|| outcome.relevant_documents.clone()),
			result_data: (!outcome.data.is_empty()).then(|| outcome.data.clone()),
		};
		let persisted = self
			.persist_turn_pair(&user_id, &project_id, &user_turn, &assistant_turn)
			.await;
		let chat_history = self
			.load_history(
				&user_id,
				&project_id,
				persisted,
				req.chat_history.unwrap_or_default(),
				&user_turn,
				&assistant_turn,
			)
			.await;

		let elapsed_ms = (OffsetDateTime::now_utc() - started).whole_milliseconds() as i64;
		let details = serde_json::json!({
			"stage": outcome.stage,
			"sqlQuery": outcome.sql_query.clone(),
			"documentsFound": outcome.relevant_documents.len(),
			"usage": serde_json::to_value(outcome.usage).unwrap_or(Value::Null),
			"elapsedMs": elapsed_ms,
		});

		self.log_procedure(&user_id, &project_id, "pipeline", &details).await;

		Ok(AskResponse {
			success: outcome.success,
			query,
			sql_query: outcome.sql_query,
			answer: outcome.answer,
			data: outcome.data,
			chat_history,
			relevant_documents: outcome.relevant_documents.clone(),
			search_stats: SearchStats {
				total_documents_found: outcome.relevant_documents.len(),
				min_cosine_threshold: min_cosine,
				top_k,
			},
		})
	}

	async fn run_pipeline(
		&self,
		query: &str,
		project_id: &str,
		district_hints: &[String],
		min_cosine: f32,
		top_k: u32,
		answer_language: &str,
	) -> Result<TurnOutcome> {
		// Normalize.
		let normalized = match self.normalize_query(query, district_hints).await {
			Ok(LocationOutcome::Located(normalized)) => normalized,
			Ok(LocationOutcome::Unlocatable) =>
				return Ok(TurnOutcome::terminal(
					"unlocatable",
					summarize::unlocatable_answer(answer_language),
				)),
			Err(Error::Provider { message }) => {
				tracing::warn!(error = %message, "Normalization failed.");

				return Ok(TurnOutcome::failed(
					"normalize_failed",
					summarize::stage_failure_answer(answer_language, &message),
				));
			},
			Err(err) => return Err(err),
		};

		tracing::debug!(normalized = %normalized.text, "Query normalized.");

		// Embed.
		let embedding = match self.embed_query(&normalized.text).await {
			Ok(vector) => vector,
			Err(Error::Provider { message }) => {
				tracing::warn!(error = %message, "Query embedding failed.");

				return Ok(TurnOutcome::failed(
					"embed_failed",
					summarize::stage_failure_answer(answer_language, &message),
				));
			},
			Err(err) => return Err(err),
		};

		// Retrieve schema documents.
		let params =
			RetrievalParams { min_vector_score: min_cosine, top_k, alpha: self.cfg.retrieval.alpha };
		let schema_docs = self
			.retrieve(project_id, &normalized.text, &embedding, Corpus::Schema, &params)
			.await?;

		if schema_docs.is_empty() {
			return Ok(TurnOutcome::terminal(
				"no_schema_match",
				summarize::no_schema_answer(answer_language),
			));
		}

		// Synthesize.
		let statement = match self.synthesize_sql(&normalized.text, &schema_docs).await {
			Ok(statement) => statement,
			Err(Error::Provider { message }) => {
				tracing::warn!(error = %message, "SQL synthesis failed.");

				return Ok(TurnOutcome {
					relevant_documents: schema_docs,
					..TurnOutcome::failed(
						"synthesize_failed",
						summarize::stage_failure_answer(answer_language, &message),
					)
				});
			},
			Err(err) => return Err(err),
		};

		// Execute, unless synthesis produced nothing.
		let (sql_query, data) = match &statement {
			None => (None, Vec::new()),
			Some(statement) => {
				let schema = sandbox::project_schema(project_id);

				match sandbox::execute(&self.db.pool, &schema, &statement.cleaned).await {
					Ok(rows) => (Some(statement.cleaned.clone()), rows),
					Err(tanya_storage::Error::Execution { message }) => {
						tracing::warn!(error = %message, "Sandboxed execution failed.");

						// The captured message is the turn's content; the
						// request itself still succeeds conversationally.
						return Ok(TurnOutcome {
							success: true,
							stage: "execution_failed",
							answer: summarize::execution_failure_answer(answer_language, &message),
							sql_query: Some(statement.cleaned.clone()),
							data: Vec::new(),
							relevant_documents: schema_docs,
							usage: TokenUsage::zero(UsageSource::Estimated),
						});
					},
					Err(err) => return Err(err.into()),
				}
			},
		};

		// Without SQL rows, fall back to document-corpus snippets plus
		// best-effort memory as summarization context.
		let mut snippets = Vec::new();

		if data.is_empty() {
			match self
				.retrieve(project_id, &normalized.text, &embedding, Corpus::Documents, &params)
				.await
			{
				Ok(candidates) =>
					snippets.extend(candidates.into_iter().map(|candidate| candidate.text)),
				Err(err) => {
					tracing::warn!(error = %err, "Document retrieval failed; summarizing without snippets.");
				},
			}

			let user_scoped_memory = self
				.retrieve_semantic(project_id, &embedding, self.cfg.memory.semantic_top_k)
				.await;

			snippets.extend(user_scoped_memory);
		}

		// Summarize.
		match self.summarize(query, &data, &snippets, answer_language).await {
			Ok(summary) => Ok(TurnOutcome {
				success: true,
				stage: if sql_query.is_some() { "summarized" } else { "sql_empty" },
				answer: summary.text,
				sql_query,
				data,
				relevant_documents: schema_docs,
				usage: summary.usage,
			}),
			Err(Error::Provider { message }) => {
				tracing::warn!(error = %message, "Summarization failed.");

				Ok(TurnOutcome {
					success: false,
					stage: "summarize_failed",
					answer: summarize::stage_failure_answer(answer_language, &message),
					sql_query,
					data,
					relevant_documents: schema_docs,
					usage: TokenUsage::zero(UsageSource::Estimated),
				})
			},
			Err(err) => Err(err),
		}
	}

	/// Returns whether the pair landed in storage. Persistence failures are
	/// logged and the in-memory response is returned regardless.
	async fn persist_turn_pair(
		&self,
		user_id: &str,
		project_id: &str,
		user_turn: &ChatTurn,
		assistant_turn: &ChatTurn,
	) -> bool {
		let result = chat::append_turn_pair(
			&self.db.pool,
			&to_row(user_id, project_id, user_turn),
			&to_row(user_id, project_id, assistant_turn),
		)
		.await;

		match result {
			Ok(()) => true,
			Err(err) => {
				tracing::warn!(error = %err, "Chat history persistence failed; returning the in-memory turns.");

				false
			},
		}
	}

	async fn load_history(
		&self,
		user_id: &str,
		project_id: &str,
		persisted: bool,
		request_history: Vec<ChatTurn>,
		user_turn: &ChatTurn,
		assistant_turn: &ChatTurn,
	) -> Vec<ChatTurn> {
		if persisted {
			match chat::conversation_turns(&self.db.pool, user_id, project_id).await {
				Ok(rows) => return rows.iter().map(from_row).collect(),
				Err(err) => {
					tracing::warn!(error = %err, "Chat history read failed; returning the in-memory turns.");
				},
			}
		}

		let mut history = request_history;

		history.push(user_turn.clone());
		history.push(assistant_turn.clone());

		history
	}
}

fn to_row(user_id: &str, project_id: &str, turn: &ChatTurn) -> ChatTurnRow {
	ChatTurnRow {
		turn_id: Uuid::new_v4(),
		// Assigned by the database on insert.
		seq: 0,
		user_id: user_id.to_string(),
		project_id: project_id.to_string(),
		role: turn.role.clone(),
		content: turn.content.clone(),
		sql_query: turn.sql_query.clone(),
		rag_documents: turn
			.rag_documents
			.as_ref()
			.and_then(|documents| serde_json::to_value(documents).ok()),
		result_data: turn.result_data.as_ref().map(|rows| Value::Array(rows.clone())),
		created_at: turn.timestamp,
	}
}

fn from_row(row: &ChatTurnRow) -> ChatTurn {
	ChatTurn {
		role: row.role.clone(),
		content: row.content.clone(),
		timestamp: row.created_at,
		sql_query: row.sql_query.clone(),
		rag_documents: row
			.rag_documents
			.as_ref()
			.and_then(|value| serde_json::from_value(value.clone()).ok()),
		result_data: row.result_data.as_ref().and_then(|value| match value {
			Value::Array(rows) => Some(rows.clone()),
			_ => None,
		}),
	}
}

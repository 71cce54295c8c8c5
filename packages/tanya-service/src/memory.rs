//! Memory store glue: semantic, episodic, and procedural memory.
//!
//! Memory is context enrichment, never a hard dependency. Reads degrade to
//! empty lists with a warning; procedural logging is fire-and-forget.

use serde_json::Value;
use time::OffsetDateTime;

use tanya_storage::{memory, vector_literal};

use crate::{Result, TanyaService};

impl TanyaService {
	/// Persist a semantic memory record. The content is embedded first;
	/// when embedding fails the record is stored without a vector and stays
	/// out of similarity retrieval until re-embedded.
	pub async fn save_semantic(
		&self,
		user_id: &str,
		project_id: &str,
		content: &str,
		tags: &[String],
	) -> Result<()> {
		let embedding = match self.embed_query(content).await {
			Ok(vector) => Some(vector_literal(&vector)),
			Err(err) => {
				tracing::warn!(error = %err, "Memory embedding failed; storing record without a vector.");

				None
			},
		};

		memory::insert_record(
			&self.db.pool,
			user_id,
			project_id,
			content,
			embedding.as_deref(),
			tags,
			OffsetDateTime::now_utc(),
		)
		.await?;

		Ok(())
	}

	/// Contents of the semantic records most similar to the query
	/// embedding. Procedural records are excluded unless the deployment
	/// opts in.
	pub async fn retrieve_semantic(
		&self,
		project_id: &str,
		query_embedding: &[f32],
		top_k: u32,
	) -> Vec<String> {
		let embedding = vector_literal(query_embedding);

		match memory::semantic_contents(
			&self.db.pool,
			project_id,
			&embedding,
			top_k,
			self.cfg.memory.include_procedures,
		)
		.await
		{
			Ok(contents) => contents,
			Err(err) => {
				tracing::warn!(error = %err, "Semantic memory retrieval failed; continuing without it.");

				Vec::new()
			},
		}
	}

	/// The most recent turns of the conversation, oldest first.
	pub async fn retrieve_episodic(
		&self,
		user_id: &str,
		project_id: &str,
		top_k: u32,
	) -> Vec<String> {
		match memory::recent_turn_summaries(&self.db.pool, user_id, project_id, top_k).await {
			Ok(turns) => turns,
			Err(err) => {
				tracing::warn!(error = %err, "Episodic memory retrieval failed; continuing without it.");

				Vec::new()
			},
		}
	}

	/// Record one pipeline run as procedural memory: a semantic record
	/// tagged `procedure`.
	pub async fn log_procedure(&self, user_id: &str, project_id: &str, name: &str, details: &Value) {
		let content = format!("{name}: {details}");

		if let Err(err) = self
			.save_semantic(user_id, project_id, &content, &[memory::PROCEDURE_TAG.to_string()])
			.await
		{
			tracing::warn!(error = %err, "Procedural memory write failed.");
		}
	}
}

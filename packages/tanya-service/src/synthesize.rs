//! Schema-grounded SQL synthesis.

use serde_json::Value;

use tanya_domain::sql::{self, SqlStatement};

use crate::{Result, RetrievalCandidate, TanyaService};

/// Default row cap appended to non-aggregate statements.
pub const DEFAULT_ROW_LIMIT: u32 = 10;

/// Marker the model must emit when the schema cannot answer the question.
const NO_QUERY_MARKER: &str = "NO_QUERY";

impl TanyaService {
	/// Produce a single read-only statement grounded in the retrieved schema
	/// documents, or `None` when the question cannot be answered via SQL.
	pub async fn synthesize_sql(
		&self,
		question: &str,
		schema_docs: &[RetrievalCandidate],
	) -> Result<Option<SqlStatement>> {
		if schema_docs.is_empty() {
			return Ok(None);
		}

		let messages = build_sql_messages(question, schema_docs);
		let completion = self.complete_with_cache("sql", &messages).await?;

		Ok(shape_statement(&completion.content))
	}
}

fn build_sql_messages(question: &str, schema_docs: &[RetrievalCandidate]) -> Vec<Value> {
	let schema_context: Vec<&str> =
		schema_docs.iter().map(|candidate| candidate.text.as_str()).collect();
	let system = format!(
		"You translate questions into a single PostgreSQL SELECT statement. \
		 Rules: use only table and column names that appear verbatim in the provided schema \
		 descriptions; double-quote every identifier; never qualify a table with a schema name, \
		 the session schema is already set; filter free text with ILIKE and %-wrapped terms, not \
		 equality; produce exactly one statement with no commentary and no markdown; when the \
		 question cannot be answered from this schema, respond with exactly {NO_QUERY_MARKER}."
	);
	let user = format!("Schema:\n{}\n\nQuestion: {question}", schema_context.join("\n"));

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user }),
	]
}

/// Clean the model output into an executable statement. Anything that is not
/// a lone SELECT (or WITH) survives as `None`, never as a statement.
pub(crate) fn shape_statement(content: &str) -> Option<SqlStatement> {
	if content.trim().is_empty() || content.contains(NO_QUERY_MARKER) {
		return None;
	}

	let statement = sql::clean(content)?;
	let lowered = statement.cleaned.to_lowercase();

	if !(lowered.starts_with("select") || lowered.starts_with("with")) {
		return None;
	}

	let cleaned = sql::ensure_limit(&statement.cleaned, DEFAULT_ROW_LIMIT);

	Some(SqlStatement { raw: statement.raw, cleaned })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fenced_select_is_cleaned_and_limited() {
		let statement = shape_statement(
			"```sql\nSELECT * FROM \"proj\".\"projects\" WHERE \"district\" ILIKE '%Bandung%';```",
		)
		.expect("Expected a statement.");

		assert_eq!(
			statement.cleaned,
			"SELECT * FROM \"projects\" WHERE \"district\" ILIKE '%Bandung%' LIMIT 10;"
		);
	}

	#[test]
	fn aggregates_keep_their_shape() {
		let statement = shape_statement("SELECT COUNT(*) FROM \"projects\";")
			.expect("Expected a statement.");

		assert_eq!(statement.cleaned, "SELECT COUNT(*) FROM \"projects\";");
	}

	#[test]
	fn no_query_marker_means_no_statement() {
		assert!(shape_statement("NO_QUERY").is_none());
		assert!(shape_statement("").is_none());
	}

	#[test]
	fn non_select_statements_are_rejected() {
		assert!(shape_statement("UPDATE \"projects\" SET \"type\" = 'x';").is_none());
		assert!(shape_statement("DROP TABLE \"projects\";").is_none());
	}

	#[test]
	fn cte_statements_are_accepted() {
		let statement = shape_statement(
			"WITH t AS (SELECT \"district\" FROM \"projects\") SELECT * FROM t;",
		)
		.expect("Expected a statement.");

		assert!(statement.cleaned.starts_with("WITH"));
	}
}

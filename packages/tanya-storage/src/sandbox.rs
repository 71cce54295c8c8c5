//! Sandboxed execution of synthesized SQL.
//!
//! Every call runs on its own pooled connection inside a READ ONLY
//! transaction with `search_path` pinned to the project's schema via a
//! transaction-local `set_config`, so nothing leaks across projects and the
//! connection returns to the pool on every exit path.

use serde_json::Value;
use sqlx::Row;

use crate::{Error, Result};

/// Postgres schema that holds one project's tables.
pub fn project_schema(project_id: &str) -> String {
	let sanitized: String = project_id
		.trim()
		.to_ascii_lowercase()
		.chars()
		.map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
		.collect();

	format!("proj_{sanitized}")
}

/// Execute one cleaned, read-only statement against a project schema and
/// return its rows as JSON objects.
///
/// Statement failures (syntax, missing relation, permission) come back as
/// [`Error::Execution`] with the database's message; they are never retried
/// here. Infrastructure failures (acquire, transaction plumbing) surface as
/// [`Error::Sqlx`].
pub async fn execute(pool: &sqlx::PgPool, schema: &str, cleaned_sql: &str) -> Result<Vec<Value>> {
	if !is_valid_schema_name(schema) {
		return Err(Error::InvalidArgument(format!("Invalid schema name: {schema}")));
	}

	let inner = cleaned_sql.trim().trim_end_matches(';').trim_end();

	if inner.is_empty() {
		return Err(Error::InvalidArgument("Cannot execute an empty statement.".to_string()));
	}

	// One scoped connection per call: the transaction holds it and the pool
	// gets it back on every exit path, including errors.
	let mut tx = pool.begin().await?;

	sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;
	sqlx::query("SELECT set_config('search_path', $1, true)")
		.bind(schema)
		.execute(&mut *tx)
		.await?;

	let wrapped =
		format!("SELECT COALESCE(json_agg(row_to_json(q)), '[]'::json) AS rows FROM ({inner}) AS q");
	let row = sqlx::query(&wrapped)
		.fetch_one(&mut *tx)
		.await
		.map_err(|err| Error::Execution { message: err.to_string() })?;
	let rows: Value = row.try_get("rows")?;

	// Read-only: roll back so the search_path override and any snapshot end
	// with the call.
	tx.rollback().await?;

	match rows {
		Value::Array(list) => Ok(list),
		Value::Null => Ok(Vec::new()),
		other => Ok(vec![other]),
	}
}

fn is_valid_schema_name(schema: &str) -> bool {
	let mut chars = schema.chars();
	let Some(first) = chars.next() else {
		return false;
	};

	(first.is_ascii_lowercase() || first == '_')
		&& chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
}

#[cfg(test)]
mod tests {
	use super::{is_valid_schema_name, project_schema};

	#[test]
	fn project_schema_is_sanitized() {
		assert_eq!(project_schema("Proj-42"), "proj_proj_42");
		assert_eq!(project_schema("abc"), "proj_abc");
	}

	#[test]
	fn schema_names_are_validated() {
		assert!(is_valid_schema_name("proj_abc"));
		assert!(!is_valid_schema_name(""));
		assert!(!is_valid_schema_name("proj abc"));
		assert!(!is_valid_schema_name("proj\"; DROP"));
	}
}

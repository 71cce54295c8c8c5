//! Cleaning and shaping of model-generated SQL.
//!
//! Statements run against exactly one active schema per project, so
//! schema-qualified identifiers are stripped before execution. Only the
//! first terminal statement survives cleaning.

use regex::Regex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqlStatement {
	pub raw: String,
	pub cleaned: String,
}

/// Strip markdown fences and schema qualifiers, and truncate to a single
/// terminal statement. Returns `None` when nothing usable remains.
pub fn clean(raw: &str) -> Option<SqlStatement> {
	let mut text = raw.trim().to_string();

	if let Some(caps) = Regex::new(r"(?s)```(?:sql)?\s*(.*?)```").ok().and_then(|re| {
		let captures = re.captures(&text)?;

		captures.get(1).map(|group| group.as_str().trim().to_string())
	}) {
		text = caps;
	} else {
		// Unpaired fence markers from a truncated model response.
		text = text
			.trim_start_matches("```sql")
			.trim_start_matches("```")
			.trim_end_matches("```")
			.trim()
			.to_string();
	}

	if let Ok(re) = Regex::new(r#""[A-Za-z_][A-Za-z0-9_]*"\."([A-Za-z_][A-Za-z0-9_]*)""#) {
		text = re.replace_all(&text, "\"$1\"").into_owned();
	}

	if let Some(position) = text.find(';') {
		text.truncate(position + 1);
	}

	let cleaned = text.trim();

	if cleaned.is_empty() || cleaned == ";" {
		return None;
	}

	Some(SqlStatement { raw: raw.to_string(), cleaned: cleaned.to_string() })
}

/// Whether the statement aggregates rows; aggregate results are already
/// bounded, so no default LIMIT is applied to them.
pub fn is_aggregate(sql: &str) -> bool {
	Regex::new(r"(?i)\b(count|sum|avg|min|max)\s*\(")
		.map(|re| re.is_match(sql))
		.unwrap_or(false)
		|| Regex::new(r"(?i)\bgroup\s+by\b").map(|re| re.is_match(sql)).unwrap_or(false)
}

pub fn has_limit(sql: &str) -> bool {
	Regex::new(r"(?i)\blimit\s+\d+").map(|re| re.is_match(sql)).unwrap_or(false)
}

/// Append `LIMIT <default>` to non-aggregate statements that carry no
/// explicit limit.
pub fn ensure_limit(sql: &str, default_limit: u32) -> String {
	if is_aggregate(sql) || has_limit(sql) {
		return sql.to_string();
	}

	let trimmed = sql.trim_end();

	match trimmed.strip_suffix(';') {
		Some(body) => format!("{} LIMIT {default_limit};", body.trim_end()),
		None => format!("{trimmed} LIMIT {default_limit}"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_fences_and_schema_qualifier() {
		let statement =
			clean("```sql\nSELECT * FROM \"proj\".\"table\";```").expect("Expected a statement.");

		assert_eq!(statement.cleaned, "SELECT * FROM \"table\";");
	}

	#[test]
	fn keeps_plain_statement_untouched() {
		let statement = clean("SELECT \"id\" FROM \"projects\";").expect("Expected a statement.");

		assert_eq!(statement.cleaned, "SELECT \"id\" FROM \"projects\";");
	}

	#[test]
	fn truncates_to_first_terminal_statement() {
		let statement = clean("SELECT 1; DROP TABLE \"projects\";").expect("Expected a statement.");

		assert_eq!(statement.cleaned, "SELECT 1;");
	}

	#[test]
	fn empty_output_cleans_to_none() {
		assert!(clean("").is_none());
		assert!(clean("```sql\n```").is_none());
		assert!(clean(";").is_none());
	}

	#[test]
	fn aggregate_detection() {
		assert!(is_aggregate("SELECT COUNT(*) FROM \"projects\";"));
		assert!(is_aggregate("SELECT \"type\", SUM(\"area\") FROM \"projects\" GROUP BY \"type\";"));
		assert!(!is_aggregate("SELECT * FROM \"projects\";"));
	}

	#[test]
	fn default_limit_is_appended_once() {
		let limited = ensure_limit("SELECT * FROM \"projects\";", 10);

		assert_eq!(limited, "SELECT * FROM \"projects\" LIMIT 10;");
		assert_eq!(ensure_limit(&limited, 10), limited);
	}

	#[test]
	fn aggregates_and_explicit_limits_are_left_alone() {
		assert_eq!(
			ensure_limit("SELECT COUNT(*) FROM \"projects\";", 10),
			"SELECT COUNT(*) FROM \"projects\";"
		);
		assert_eq!(
			ensure_limit("SELECT * FROM \"projects\" LIMIT 3;", 10),
			"SELECT * FROM \"projects\" LIMIT 3;"
		);
	}

	#[test]
	fn limit_is_appended_without_trailing_semicolon() {
		assert_eq!(ensure_limit("SELECT * FROM \"projects\"", 10), "SELECT * FROM \"projects\" LIMIT 10");
	}
}

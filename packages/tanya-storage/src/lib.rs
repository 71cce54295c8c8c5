pub mod cache;
pub mod chat;
pub mod db;
pub mod documents;
pub mod jobs;
pub mod memory;
pub mod models;
pub mod sandbox;
pub mod schema;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Render a vector as the pgvector text literal `[v0,v1,…]`, bound as
/// `$n::text::vector` in queries.
pub fn vector_literal(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);
	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}
		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

#[cfg(test)]
mod tests {
	use super::vector_literal;

	#[test]
	fn vector_literal_is_bracketed_and_comma_separated() {
		assert_eq!(vector_literal(&[0.5, -1.0, 2.0]), "[0.5,-1,2]");
		assert_eq!(vector_literal(&[]), "[]");
	}
}

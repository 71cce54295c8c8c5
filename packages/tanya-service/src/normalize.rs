//! Query normalization.
//!
//! The language model only *extracts*: it spots location mentions, fixes
//! obvious spelling, and reports them as strict JSON. The deterministic
//! grammar in `tanya_domain::location` does the rewriting, so hint
//! precedence, macro-region expansion, and tier handling never depend on
//! model behavior.

use serde::Deserialize;
use serde_json::Value;

use tanya_domain::location::{
	self, DistrictMention, LocationExtraction, LocationOutcome, RegionMention, Tier,
};

use crate::{Error, Result, TanyaService};

#[derive(Debug, Deserialize)]
struct RawExtraction {
	#[serde(default)]
	districts: Vec<RawDistrict>,
	#[serde(default)]
	provinces: Vec<RawRegion>,
	#[serde(default)]
	macro_regions: Vec<RawRegion>,
	#[serde(default)]
	project_location: bool,
}

#[derive(Debug, Deserialize)]
struct RawDistrict {
	mention: String,
	name: String,
	#[serde(default)]
	tier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRegion {
	mention: String,
	name: String,
}

impl TanyaService {
	/// Normalize a question's locations into the canonical grammar, or
	/// report that no location can be resolved.
	///
	/// Malformed extractor output is fatal for the turn; there is no silent
	/// fallback past a provider that stopped speaking JSON.
	pub async fn normalize_query(
		&self,
		question: &str,
		district_hints: &[String],
	) -> Result<LocationOutcome> {
		let messages = build_extraction_messages(question);
		let completion = self.complete_with_cache("normalize", &messages).await?;
		let extraction = parse_extraction(&completion.content)?;

		Ok(location::canonicalize(question, &extraction, district_hints))
	}
}

fn build_extraction_messages(question: &str) -> Vec<Value> {
	let system = format!(
		"You extract Indonesian administrative locations from a question about project data. \
		 Respond with strict JSON only, no prose, using this shape: \
		 {{\"districts\": [{{\"mention\": \"verbatim substring\", \"name\": \"corrected bare name\", \"tier\": \"Kab\"|\"Kota\"|null}}], \
		 \"provinces\": [{{\"mention\": \"...\", \"name\": \"official province name\"}}], \
		 \"macro_regions\": [{{\"mention\": \"...\", \"name\": \"region name\"}}], \
		 \"project_location\": false}}. \
		 Rules: `mention` is the exact substring of the question, including any tier words such as \
		 Kab, Kabupaten, Kota, or the word district; `name` fixes obvious spelling errors but keeps \
		 the official Indonesian name; report a tier only when the question states one. \
		 Macro-regions are island groupings: {}. \
		 Set project_location to true when the question refers to the project's own location \
		 instead of naming one. Use empty arrays when nothing matches.",
		location::known_macro_regions().join(", ")
	);

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": question }),
	]
}

fn parse_extraction(content: &str) -> Result<LocationExtraction> {
	let raw: RawExtraction = serde_json::from_str(strip_code_fences(content)).map_err(|_| {
		Error::Provider { message: "Location extraction returned invalid JSON.".to_string() }
	})?;

	Ok(LocationExtraction {
		districts: raw
			.districts
			.into_iter()
			.map(|district| DistrictMention {
				mention: district.mention,
				name: district.name,
				tier: district.tier.as_deref().and_then(Tier::parse),
			})
			.collect(),
		provinces: raw
			.provinces
			.into_iter()
			.map(|province| RegionMention { mention: province.mention, name: province.name })
			.collect(),
		macro_regions: raw
			.macro_regions
			.into_iter()
			.map(|region| RegionMention { mention: region.mention, name: region.name })
			.collect(),
		project_location: raw.project_location,
	})
}

fn strip_code_fences(content: &str) -> &str {
	let trimmed = content.trim();
	let trimmed = trimmed.strip_prefix("```json").unwrap_or(trimmed);
	let trimmed = trimmed.strip_prefix("```").unwrap_or(trimmed);
	let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);

	trimmed.trim()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_a_full_extraction() {
		let content = r#"{
			"districts": [{ "mention": "Kota Bandng", "name": "Bandung", "tier": "Kota" }],
			"provinces": [],
			"macro_regions": [{ "mention": "Kalimantan", "name": "Kalimantan" }],
			"project_location": false
		}"#;
		let extraction = parse_extraction(content).expect("parse failed");

		assert_eq!(extraction.districts.len(), 1);
		assert_eq!(extraction.districts[0].name, "Bandung");
		assert_eq!(extraction.districts[0].tier, Some(Tier::Kota));
		assert_eq!(extraction.macro_regions.len(), 1);
	}

	#[test]
	fn missing_fields_default_to_empty() {
		let extraction = parse_extraction("{}").expect("parse failed");

		assert!(extraction.districts.is_empty());
		assert!(extraction.provinces.is_empty());
		assert!(!extraction.project_location);
	}

	#[test]
	fn fenced_json_is_accepted() {
		let extraction =
			parse_extraction("```json\n{\"project_location\": true}\n```").expect("parse failed");

		assert!(extraction.project_location);
	}

	#[test]
	fn prose_output_is_a_provider_error() {
		let result = parse_extraction("The question mentions Bandung.");

		assert!(matches!(result, Err(Error::Provider { .. })));
	}

	#[test]
	fn unknown_tier_labels_parse_to_none() {
		let content = r#"{ "districts": [{ "mention": "x", "name": "X", "tier": "Desa" }] }"#;
		let extraction = parse_extraction(content).expect("parse failed");

		assert_eq!(extraction.districts[0].tier, None);
	}
}

//! Indonesian administrative-location grammar.
//!
//! Districts (kabupaten/kota), provinces, and informal macro-regions are
//! rendered into a fixed canonical form: `district Kab <Name>`,
//! `district Kota <Name>`, `province <Name>`. Macro-regions expand to their
//! exhaustive member-province lists. The grammar is deterministic; spelling
//! correction and mention spotting happen upstream in the language model.

use unicode_normalization::UnicodeNormalization;

/// Member provinces per recognized macro-region. Lists are exhaustive; a
/// macro-region mention is replaced by every member, never a subset.
const MACRO_REGIONS: &[(&str, &[&str])] = &[
	("Kalimantan", &[
		"Kalimantan Barat",
		"Kalimantan Tengah",
		"Kalimantan Selatan",
		"Kalimantan Timur",
		"Kalimantan Utara",
	]),
	("Java", &["Banten", "DKI Jakarta", "Jawa Barat", "Jawa Tengah", "DI Yogyakarta", "Jawa Timur"]),
	("Jawa", &["Banten", "DKI Jakarta", "Jawa Barat", "Jawa Tengah", "DI Yogyakarta", "Jawa Timur"]),
	("Sumatra", &[
		"Aceh",
		"Sumatera Utara",
		"Sumatera Barat",
		"Riau",
		"Kepulauan Riau",
		"Jambi",
		"Sumatera Selatan",
		"Kepulauan Bangka Belitung",
		"Bengkulu",
		"Lampung",
	]),
	("Sumatera", &[
		"Aceh",
		"Sumatera Utara",
		"Sumatera Barat",
		"Riau",
		"Kepulauan Riau",
		"Jambi",
		"Sumatera Selatan",
		"Kepulauan Bangka Belitung",
		"Bengkulu",
		"Lampung",
	]),
	("Sulawesi", &[
		"Sulawesi Utara",
		"Gorontalo",
		"Sulawesi Tengah",
		"Sulawesi Barat",
		"Sulawesi Selatan",
		"Sulawesi Tenggara",
	]),
	("Papua", &[
		"Papua",
		"Papua Barat",
		"Papua Barat Daya",
		"Papua Tengah",
		"Papua Pegunungan",
		"Papua Selatan",
	]),
	("Maluku", &["Maluku", "Maluku Utara"]),
	("Nusa Tenggara", &["Nusa Tenggara Barat", "Nusa Tenggara Timur"]),
];

/// Names that exist administratively as both a kabupaten and a kota. A
/// tierless mention of one of these expands to both forms.
const DUAL_FORM_DISTRICTS: &[&str] = &[
	"Bandung",
	"Bekasi",
	"Bima",
	"Blitar",
	"Bogor",
	"Cirebon",
	"Gorontalo",
	"Jayapura",
	"Kediri",
	"Madiun",
	"Magelang",
	"Malang",
	"Mojokerto",
	"Pasuruan",
	"Pekalongan",
	"Probolinggo",
	"Semarang",
	"Serang",
	"Solok",
	"Sorong",
	"Sukabumi",
	"Tangerang",
	"Tasikmalaya",
	"Tegal",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
	Kabupaten,
	Kota,
}
impl Tier {
	pub fn label(self) -> &'static str {
		match self {
			Self::Kabupaten => "Kab",
			Self::Kota => "Kota",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().trim_end_matches('.').to_ascii_lowercase().as_str() {
			"kab" | "kabupaten" | "regency" => Some(Self::Kabupaten),
			"kota" | "city" => Some(Self::Kota),
			_ => None,
		}
	}
}

#[derive(Clone, Debug)]
pub struct DistrictMention {
	/// The verbatim substring of the question that named this district,
	/// including any tier words already present.
	pub mention: String,
	/// Spell-corrected bare name, without a tier prefix.
	pub name: String,
	pub tier: Option<Tier>,
}

#[derive(Clone, Debug)]
pub struct RegionMention {
	pub mention: String,
	pub name: String,
}

#[derive(Clone, Debug, Default)]
pub struct LocationExtraction {
	pub districts: Vec<DistrictMention>,
	pub provinces: Vec<RegionMention>,
	pub macro_regions: Vec<RegionMention>,
	/// The question referred to "the project location" rather than naming one.
	pub project_location: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedQuery {
	pub text: String,
	/// Canonical location phrases, in question order.
	pub phrases: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LocationOutcome {
	Located(NormalizedQuery),
	Unlocatable,
}

pub fn district_phrase(tier: Tier, name: &str) -> String {
	format!("district {} {}", tier.label(), name)
}

pub fn province_phrase(name: &str) -> String {
	format!("province {name}")
}

pub fn macro_region_provinces(name: &str) -> Option<&'static [&'static str]> {
	let name = name.trim();

	MACRO_REGIONS
		.iter()
		.find(|(region, _)| region.eq_ignore_ascii_case(name))
		.map(|(_, provinces)| *provinces)
}

/// Recognized macro-region names, including spelling aliases.
pub fn known_macro_regions() -> Vec<&'static str> {
	MACRO_REGIONS.iter().map(|(region, _)| *region).collect()
}

pub fn is_dual_form(name: &str) -> bool {
	let name = name.trim();

	DUAL_FORM_DISTRICTS.iter().any(|district| district.eq_ignore_ascii_case(name))
}

/// Apply the location grammar to a question.
///
/// Districts named in the question win outright: hints are then ignored
/// entirely, never merged. When the question names no district, hinted
/// districts are appended, even alongside province or macro-region
/// mentions. With no mentions and no hints the question is unlocatable.
pub fn canonicalize(
	question: &str,
	extraction: &LocationExtraction,
	district_hints: &[String],
) -> LocationOutcome {
	let mut text: String = question.nfkc().collect::<String>().trim().to_string();
	let mut phrases = Vec::new();

	for district in &extraction.districts {
		let (replacement, district_phrases) = render_district(district);

		text = replace_mention(&text, &district.mention, &replacement);
		phrases.extend(district_phrases);
	}
	for region in &extraction.macro_regions {
		match macro_region_provinces(&region.name) {
			Some(provinces) => {
				let rendered: Vec<String> =
					provinces.iter().map(|province| province_phrase(province)).collect();

				text = replace_mention(&text, &region.mention, &join_phrases(&rendered));
				phrases.extend(rendered);
			},
			// An unrecognized region name is treated as a plain province.
			None => {
				let rendered = province_phrase(region.name.trim());

				text = replace_mention(&text, &region.mention, &rendered);
				phrases.push(rendered);
			},
		}
	}
	for province in &extraction.provinces {
		let rendered = province_phrase(province.name.trim());

		text = replace_mention(&text, &province.mention, &rendered);
		phrases.push(rendered);
	}

	if extraction.districts.is_empty() && !district_hints.is_empty() {
		let hint_phrases: Vec<String> = district_hints
			.iter()
			.map(|hint| {
				let (tier, name) = parse_hint(hint);

				district_phrase(tier, &name)
			})
			.collect();

		text = format!("{text} in {}", join_phrases(&hint_phrases));
		phrases.extend(hint_phrases);
	}

	if phrases.is_empty() {
		return LocationOutcome::Unlocatable;
	}

	LocationOutcome::Located(NormalizedQuery { text, phrases })
}

fn render_district(district: &DistrictMention) -> (String, Vec<String>) {
	let name = district.name.trim();

	match district.tier {
		Some(tier) => {
			let phrase = district_phrase(tier, name);

			(phrase.clone(), vec![phrase])
		},
		None if is_dual_form(name) => {
			let kabupaten = district_phrase(Tier::Kabupaten, name);
			let kota = district_phrase(Tier::Kota, name);
			let replacement = format!("{kabupaten} and {kota}");

			(replacement, vec![kabupaten, kota])
		},
		// A tierless single-form name defaults to kabupaten, the common case.
		None => {
			let phrase = district_phrase(Tier::Kabupaten, name);

			(phrase.clone(), vec![phrase])
		},
	}
}

/// Replace the first case-insensitive occurrence of `mention` with
/// `replacement`. Already-canonical text is left untouched, which makes the
/// grammar idempotent.
fn replace_mention(text: &str, mention: &str, replacement: &str) -> String {
	let mention = mention.trim();

	if mention.is_empty() || contains_ignore_case(text, replacement) {
		return text.to_string();
	}

	let Some(start) = find_ignore_case(text, mention) else {
		return text.to_string();
	};

	let mut out = String::with_capacity(text.len() + replacement.len());

	out.push_str(&text[..start]);
	out.push_str(replacement);
	out.push_str(&text[start + mention.len()..]);

	out
}

fn parse_hint(hint: &str) -> (Tier, String) {
	let hint = hint.trim();

	if let Some((head, rest)) = hint.split_once(char::is_whitespace)
		&& let Some(tier) = Tier::parse(head)
	{
		return (tier, rest.trim().to_string());
	}

	(Tier::Kabupaten, hint.to_string())
}

/// "a", "a and b", "a, b and c".
pub fn join_phrases(phrases: &[String]) -> String {
	match phrases {
		[] => String::new(),
		[only] => only.clone(),
		[init @ .., last] => format!("{} and {last}", init.join(", ")),
	}
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
	find_ignore_case(haystack, needle).is_some()
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
	if needle.is_empty() {
		return None;
	}

	let haystack_lower = haystack.to_lowercase();
	let needle_lower = needle.to_lowercase();
	let position = haystack_lower.find(&needle_lower)?;

	// Lowercasing may shift byte offsets for non-ASCII text; resolve the
	// position back onto the original string by character count.
	let char_index = haystack_lower[..position].chars().count();

	Some(haystack.char_indices().nth(char_index).map(|(index, _)| index).unwrap_or(haystack.len()))
}

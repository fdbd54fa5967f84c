//! Target-rule parsing and recognized-text observation extraction.

use serde::{Deserialize, Serialize};

use crate::dictionary::{self, Language, MATCHERS};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
	/// The input did not split into a name token and a positive integer.
	#[error("invalid mod format, expected \"<name> <min-value>\" (e.g. \"life 80\")")]
	InvalidFormat,
}

/// An operator-specified acceptance rule: a crafted item passes when a roll
/// produces `key` with at least `min_value`.
///
/// Identified by the language-independent canonical key; the localized
/// `description` is display-only. Immutable once added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetMod {
	pub key: String,
	pub description: String,
	pub min_value: i64,
	pub game_language: Language,
}

/// One `(key, value)` extracted from a recognized tooltip line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModObservation {
	pub key: String,
	pub value: i64,
}

/// Parse free-form target input (`"<name-token> <integer>"`) into a rule.
///
/// Known tokens resolve against the dictionary; unknown tokens pass through
/// as raw custom keys so mods outside the built-in table stay usable.
pub fn parse_target_mod(input: &str, lang: Language) -> Result<TargetMod, ParseError> {
	let mut parts = input.split_whitespace();
	let (Some(token), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
		return Err(ParseError::InvalidFormat);
	};

	let min_value: i64 = value.parse().map_err(|_| ParseError::InvalidFormat)?;
	if min_value <= 0 {
		return Err(ParseError::InvalidFormat);
	}

	let key = token.to_ascii_lowercase();
	let description = match dictionary::find(&key) {
		Some(def) => def.description(lang, min_value),
		None => format!("{key} {min_value}+"),
	};

	Ok(TargetMod {
		key,
		description,
		min_value,
		game_language: lang,
	})
}

/// Extract `(key, value)` observations from a block of recognized text.
///
/// Each line is matched against every pattern of the configured language.
/// Lines matching nothing are recognition noise and are dropped without
/// comment. Ranged lines ("Adds X to Y ...") record the rounded midpoint.
pub fn extract_observations(text: &str, lang: Language) -> Vec<ModObservation> {
	let matchers = &MATCHERS[&lang];
	let mut out = Vec::new();

	for line in text.lines() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}
		for m in matchers {
			for caps in m.re.captures_iter(line) {
				let value = if let Some(v) = caps.name("v") {
					v.as_str().parse::<i64>().ok()
				} else {
					let lo = caps.name("lo").and_then(|v| v.as_str().parse::<i64>().ok());
					let hi = caps.name("hi").and_then(|v| v.as_str().parse::<i64>().ok());
					match (lo, hi) {
						(Some(lo), Some(hi)) => Some(((lo + hi) as f64 / 2.0).round() as i64),
						_ => None,
					}
				};
				if let Some(value) = value {
					out.push(ModObservation { key: m.key.to_string(), value });
				}
			}
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_known_rule() {
		let rule = parse_target_mod("life 80", Language::English).unwrap();
		assert_eq!(rule.key, "life");
		assert_eq!(rule.min_value, 80);
		assert_eq!(rule.description, "Life 80+");
		assert_eq!(rule.game_language, Language::English);
	}

	#[test]
	fn parses_known_rule_localized() {
		let rule = parse_target_mod("fire-res 30", Language::SimplifiedChinese).unwrap();
		assert_eq!(rule.key, "fire-res");
		assert_eq!(rule.description, "火焰抗性 30+%");
	}

	#[test]
	fn unknown_token_passes_through() {
		let rule = parse_target_mod("frenzy 3", Language::English).unwrap();
		assert_eq!(rule.key, "frenzy");
		assert_eq!(rule.min_value, 3);
		assert_eq!(rule.description, "frenzy 3+");
	}

	#[test]
	fn rejects_malformed_input() {
		for bad in ["asdf", "", "life", "life eighty", "life 0", "life -5", "life 80 extra"] {
			assert_eq!(
				parse_target_mod(bad, Language::English),
				Err(ParseError::InvalidFormat),
				"input {bad:?}"
			);
		}
	}

	#[test]
	fn extracts_values_and_drops_noise() {
		let text = "Sapphire Ring\n+85(80-89) to maximum Life\nqq$#%(garbage\n32% increased Cast Speed\n";
		let obs = extract_observations(text, Language::English);
		assert_eq!(obs.len(), 2);
		assert_eq!(obs.iter().find(|o| o.key == "life").unwrap().value, 85);
		assert_eq!(obs.iter().find(|o| o.key == "castspeed").unwrap().value, 32);
	}

	#[test]
	fn ranged_line_records_rounded_midpoint() {
		// Midpoint of 3..8 is 5.5, rounded away from zero.
		let obs = extract_observations("Adds 3 to 8 Physical Damage", Language::English);
		assert_eq!(obs, vec![ModObservation { key: "phys-dmg".into(), value: 6 }]);
	}

	#[test]
	fn language_selects_matcher_table() {
		let zh = "+85 最大生命";
		assert_eq!(extract_observations(zh, Language::SimplifiedChinese).len(), 1);
		// The same line is noise under the English table.
		assert!(extract_observations(zh, Language::English).is_empty());
	}
}

//! Built-in affix dictionary.
//!
//! One entry per canonical mod key, with display names, recognition
//! patterns, and description templates for every supported game display
//! language. Loaded once; the compiled matchers live behind a `LazyLock`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Game client display language. Recognition patterns and display names are
/// keyed by this; the canonical mod keys never change with it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
	#[default]
	#[serde(rename = "en")]
	English,
	#[serde(rename = "zh-CN")]
	SimplifiedChinese,
}

impl Language {
	pub fn code(self) -> &'static str {
		match self {
			Language::English => "en",
			Language::SimplifiedChinese => "zh-CN",
		}
	}
}

/// A dictionary entry for one canonical mod key.
///
/// Patterns capture the rolled value as `v`, or a `lo`/`hi` pair for mods
/// whose tooltip line is a range ("Adds X to Y ..."). The optional
/// `(\d+-\d+)` group absorbs the possible-roll range some tooltips append
/// after the actual value.
pub struct ModDef {
	pub key: &'static str,
	name: [&'static str; 2],
	pattern: [&'static str; 2],
	template: [&'static str; 2],
	pub example: &'static str,
}

impl ModDef {
	pub fn name(&self, lang: Language) -> &'static str {
		self.name[lang as usize]
	}

	pub fn description(&self, lang: Language, min_value: i64) -> String {
		self.template[lang as usize].replace("{}", &min_value.to_string())
	}
}

// Index order matches the Language discriminants: [English, SimplifiedChinese].
pub static DICTIONARY: &[ModDef] = &[
	ModDef {
		key: "life",
		name: ["Life", "生命"],
		pattern: [
			r"(?i)\+(?P<v>\d+)(?:\(\d+-\d+\))?\s+TO\s+MAXIMUM\s+LIFE",
			r"\+?(?P<v>\d+)(?:\(\d+-\d+\))?\s*最大生命",
		],
		template: ["Life {}+", "生命 {}+"],
		example: "life 80",
	},
	ModDef {
		key: "mana",
		name: ["Mana", "魔力"],
		pattern: [
			r"(?i)\+(?P<v>\d+)(?:\(\d+-\d+\))?\s+TO\s+MAXIMUM\s+MANA",
			r"\+?(?P<v>\d+)(?:\(\d+-\d+\))?\s*最大魔力",
		],
		template: ["Mana {}+", "魔力 {}+"],
		example: "mana 60",
	},
	ModDef {
		key: "str",
		name: ["Strength", "力量"],
		pattern: [
			r"(?i)\+(?P<v>\d+)(?:\(\d+-\d+\))?\s+TO\s+STRENGTH",
			r"\+?(?P<v>\d+)(?:\(\d+-\d+\))?\s*力量",
		],
		template: ["Strength {}+", "力量 {}+"],
		example: "str 45",
	},
	ModDef {
		key: "dex",
		name: ["Dexterity", "敏捷"],
		pattern: [
			r"(?i)\+(?P<v>\d+)(?:\(\d+-\d+\))?\s+TO\s+DEXTERITY",
			r"\+?(?P<v>\d+)(?:\(\d+-\d+\))?\s*敏捷",
		],
		template: ["Dexterity {}+", "敏捷 {}+"],
		example: "dex 45",
	},
	ModDef {
		key: "int",
		name: ["Intelligence", "智慧"],
		pattern: [
			r"(?i)\+(?P<v>\d+)(?:\(\d+-\d+\))?\s+TO\s+INTELLIGENCE",
			r"\+?(?P<v>\d+)(?:\(\d+-\d+\))?\s*智慧",
		],
		template: ["Intelligence {}+", "智慧 {}+"],
		example: "int 45",
	},
	ModDef {
		key: "spirit",
		name: ["Spirit", "精魂"],
		pattern: [
			// OCR sometimes reads the leading + as #.
			r"(?i)[+#]?(?P<v>\d+)(?:\(\d+-\d+\))?\s+TO\s+SPIRIT",
			r"\+?(?P<v>\d+)(?:\(\d+-\d+\))?\s*精魂",
		],
		template: ["Spirit {}+", "精魂 {}+"],
		example: "spirit 50",
	},
	ModDef {
		key: "spell-level",
		name: ["Spell Skills Level", "法术技能等级"],
		pattern: [
			r"\+(?P<v>\d+)\s+TO\s+LEVEL\s+OF\s+ALL\s+SPELL\s+SKILLS",
			r"\+(?P<v>\d+)\s*(?:所有)?法术技能等级",
		],
		template: ["+{} to Level of all Spell Skills (or higher)", "+{} 法术技能等级"],
		example: "spell-level 3",
	},
	ModDef {
		key: "proj-level",
		name: ["Projectile Skills Level", "投射物技能等级"],
		pattern: [
			r"\+(?P<v>\d+)\s+TO\s+LEVEL\s+OF\s+ALL\s+PROJECTILE\s+SKILLS",
			r"\+(?P<v>\d+)\s*(?:所有)?投射物技能等级",
		],
		template: ["+{} to Level of all Projectile Skills (or higher)", "+{} 投射物技能等级"],
		example: "proj-level 3",
	},
	ModDef {
		key: "crit-dmg",
		name: ["Critical Damage Bonus", "暴击伤害加成"],
		pattern: [
			r"(?i)(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*INCREASED\s+CRITICAL\s+DAMAGE\s+BONUS",
			r"(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*暴击伤害加成",
		],
		template: ["{}%+ increased Critical Damage Bonus", "{}% 暴击伤害加成"],
		example: "crit-dmg 39",
	},
	ModDef {
		key: "fire-res",
		name: ["Fire Resistance", "火焰抗性"],
		pattern: [
			r"(?i)(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*(?:INCREASED\s+)?FIRE\s+RESISTANCE",
			r"(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*火焰抗性",
		],
		template: ["Fire Res {}+%", "火焰抗性 {}+%"],
		example: "fire-res 30",
	},
	ModDef {
		key: "cold-res",
		name: ["Cold Resistance", "冰冷抗性"],
		pattern: [
			r"(?i)(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*(?:INCREASED\s+)?COLD\s+RESISTANCE",
			r"(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*冰冷抗性",
		],
		template: ["Cold Res {}+%", "冰冷抗性 {}+%"],
		example: "cold-res 30",
	},
	ModDef {
		key: "light-res",
		name: ["Lightning Resistance", "闪电抗性"],
		pattern: [
			r"(?i)(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*(?:INCREASED\s+)?LIGHTNING\s+RESISTANCE",
			r"(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*闪电抗性",
		],
		template: ["Lightning Res {}+%", "闪电抗性 {}+%"],
		example: "light-res 30",
	},
	ModDef {
		key: "chaos-res",
		name: ["Chaos Resistance", "混沌抗性"],
		pattern: [
			r"(?i)(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*(?:INCREASED\s+)?CHAOS\s+RESISTANCE",
			r"(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*混沌抗性",
		],
		template: ["Chaos Res {}+%", "混沌抗性 {}+%"],
		example: "chaos-res 20",
	},
	ModDef {
		key: "armor",
		name: ["Armour", "护甲"],
		pattern: [
			r"(?i)(?P<v>\d+)(?:\(\d+-\d+\))?\s+(?:INCREASED\s+)?ARMOUR",
			r"(?P<v>\d+)(?:\(\d+-\d+\))?\s*护甲",
		],
		template: ["Armour {}+", "护甲 {}+"],
		example: "armor 100",
	},
	ModDef {
		key: "evasion",
		name: ["Evasion", "闪避"],
		pattern: [
			r"(?i)(?P<v>\d+)(?:\(\d+-\d+\))?\s+(?:INCREASED\s+)?EVASION",
			r"(?P<v>\d+)(?:\(\d+-\d+\))?\s*闪避",
		],
		template: ["Evasion {}+", "闪避 {}+"],
		example: "evasion 100",
	},
	ModDef {
		key: "es",
		name: ["Energy Shield", "能量护盾"],
		pattern: [
			r"(?i)\+(?P<v>\d+)(?:\(\d+-\d+\))?\s+TO\s+MAXIMUM\s+ENERGY\s+SHIELD",
			r"\+?(?P<v>\d+)(?:\(\d+-\d+\))?\s*最大能量护盾",
		],
		template: ["Energy Shield {}+", "能量护盾 {}+"],
		example: "es 50",
	},
	ModDef {
		key: "movespeed",
		name: ["Movement Speed", "移动速度"],
		pattern: [
			r"(?i)(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*(?:INCREASED\s+)?MOVEMENT\s+SPEED",
			r"(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*移动速度",
		],
		template: ["Movement Speed {}+%", "移动速度 {}+%"],
		example: "movespeed 20",
	},
	ModDef {
		key: "attackspeed",
		name: ["Attack Speed", "攻击速度"],
		pattern: [
			r"(?i)(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*(?:INCREASED\s+)?ATTACK\s+SPEED",
			r"(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*攻击速度",
		],
		template: ["Attack Speed {}+%", "攻击速度 {}+%"],
		example: "attackspeed 10",
	},
	ModDef {
		key: "castspeed",
		name: ["Cast Speed", "施放速度"],
		pattern: [
			r"(?i)(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*(?:INCREASED\s+)?CAST\s+SPEED",
			r"(?P<v>\d+)(?:\(\d+-\d+\))?%?\s*施放速度",
		],
		template: ["Cast Speed {}+%", "施放速度 {}+%"],
		example: "castspeed 10",
	},
	ModDef {
		key: "phys-dmg",
		name: ["Physical Damage", "物理伤害"],
		pattern: [
			r"(?i)ADDS\s+(?P<lo>\d+)\s+TO\s+(?P<hi>\d+)\s+PHYSICAL\s+DAMAGE",
			r"附加\s*(?P<lo>\d+)\s*-\s*(?P<hi>\d+)\s*物理伤害",
		],
		template: ["Physical Damage {}+ (range midpoint)", "物理伤害 {}+（区间中值）"],
		example: "phys-dmg 12",
	},
];

pub(crate) struct CompiledMod {
	pub key: &'static str,
	pub re: Regex,
}

pub(crate) static MATCHERS: LazyLock<HashMap<Language, Vec<CompiledMod>>> = LazyLock::new(|| {
	let mut map = HashMap::new();
	for lang in [Language::English, Language::SimplifiedChinese] {
		let compiled = DICTIONARY
			.iter()
			.map(|def| CompiledMod {
				key: def.key,
				// Patterns are static and verified by tests.
				re: Regex::new(def.pattern[lang as usize]).expect("invalid dictionary pattern"),
			})
			.collect();
		map.insert(lang, compiled);
	}
	map
});

/// Look up a dictionary entry by canonical key.
pub fn find(key: &str) -> Option<&'static ModDef> {
	DICTIONARY.iter().find(|def| def.key == key)
}

/// Display name for a key, falling back to the key itself for custom mods.
pub fn display_name(key: &str, lang: Language) -> String {
	find(key).map_or_else(|| key.to_string(), |def| def.name(lang).to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn all_patterns_compile() {
		for lang in [Language::English, Language::SimplifiedChinese] {
			assert_eq!(MATCHERS[&lang].len(), DICTIONARY.len());
		}
	}

	#[test]
	fn keys_are_unique() {
		for (i, def) in DICTIONARY.iter().enumerate() {
			assert!(
				!DICTIONARY[i + 1..].iter().any(|other| other.key == def.key),
				"duplicate key {}",
				def.key
			);
		}
	}
}

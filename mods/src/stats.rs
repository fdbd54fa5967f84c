//! Running per-mod statistics for a crafting session.

use std::collections::HashMap;

use serde::Serialize;

use crate::dictionary::{self, Language};
use crate::parser::ModObservation;

/// Running statistics for one observed mod key.
///
/// `count` only grows, `min`/`max` only widen, and `avg_value` is a running
/// mean updated in O(1) — never recomputed by replaying observations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModStat {
	pub key: String,
	pub display_name: String,
	pub count: u64,
	pub min_value: i64,
	pub max_value: i64,
	pub avg_value: f64,
}

impl ModStat {
	/// Share of rolls that produced this mod, in percent.
	///
	/// Derived at read time from the caller's *current* roll count; never
	/// stored, so it can't go stale between polls.
	pub fn probability(&self, total_rolls: u64) -> f64 {
		if total_rolls == 0 {
			return 0.0;
		}
		self.count as f64 / total_rolls as f64 * 100.0
	}
}

/// Point-in-time view of the aggregator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
	pub stats: Vec<ModStat>,
	pub total_rolls: u64,
}

/// Consumes per-roll observation batches and maintains the running stats.
#[derive(Debug)]
pub struct ModAggregator {
	language: Language,
	// Insertion-ordered stats with a key index; ties in the presentation
	// sort must resolve to the first-observed key.
	stats: Vec<ModStat>,
	index: HashMap<String, usize>,
	total_rolls: u64,
	last_roll: Vec<ModObservation>,
}

impl ModAggregator {
	pub fn new(language: Language) -> Self {
		Self {
			language,
			stats: Vec::new(),
			index: HashMap::new(),
			total_rolls: 0,
			last_roll: Vec::new(),
		}
	}

	/// Record one roll attempt and all observations it produced.
	///
	/// Every call is a new data point: the roll counter advances exactly
	/// once even when `observations` is empty.
	pub fn record_roll(&mut self, observations: Vec<ModObservation>) {
		self.total_rolls += 1;

		for obs in &observations {
			let idx = match self.index.get(&obs.key) {
				Some(&idx) => idx,
				None => {
					self.stats.push(ModStat {
						key: obs.key.clone(),
						display_name: dictionary::display_name(&obs.key, self.language),
						count: 0,
						min_value: obs.value,
						max_value: obs.value,
						avg_value: 0.0,
					});
					self.index.insert(obs.key.clone(), self.stats.len() - 1);
					self.stats.len() - 1
				}
			};

			let stat = &mut self.stats[idx];
			stat.count += 1;
			stat.min_value = stat.min_value.min(obs.value);
			stat.max_value = stat.max_value.max(obs.value);
			stat.avg_value += (obs.value as f64 - stat.avg_value) / stat.count as f64;
		}

		self.last_roll = observations;
	}

	/// Observations of the most recent roll, for target matching.
	pub fn last_roll(&self) -> &[ModObservation] {
		&self.last_roll
	}

	pub fn total_rolls(&self) -> u64 {
		self.total_rolls
	}

	/// Consistent snapshot, sorted descending by count; ties keep
	/// first-observed order (stable sort over the insertion-ordered list).
	pub fn snapshot(&self) -> StatsSnapshot {
		let mut stats = self.stats.clone();
		stats.sort_by(|a, b| b.count.cmp(&a.count));
		StatsSnapshot { stats, total_rolls: self.total_rolls }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn obs(key: &str, value: i64) -> ModObservation {
		ModObservation { key: key.into(), value }
	}

	#[test]
	fn running_stats_per_key() {
		let mut agg = ModAggregator::new(Language::English);
		agg.record_roll(vec![obs("life", 10)]);
		agg.record_roll(vec![obs("life", 20), obs("es", 5)]);
		agg.record_roll(vec![]);

		let snap = agg.snapshot();
		// Rolls, not observations.
		assert_eq!(snap.total_rolls, 3);

		let life = snap.stats.iter().find(|s| s.key == "life").unwrap();
		assert_eq!((life.count, life.min_value, life.max_value), (2, 10, 20));
		assert!((life.avg_value - 15.0).abs() < f64::EPSILON);
		assert_eq!(life.display_name, "Life");

		let es = snap.stats.iter().find(|s| s.key == "es").unwrap();
		assert_eq!((es.count, es.min_value, es.max_value), (1, 5, 5));
		assert!((es.avg_value - 5.0).abs() < f64::EPSILON);
	}

	#[test]
	fn probability_uses_current_roll_count() {
		let mut agg = ModAggregator::new(Language::English);
		agg.record_roll(vec![obs("life", 50)]);
		let early = agg.snapshot();
		assert!((early.stats[0].probability(early.total_rolls) - 100.0).abs() < 1e-9);

		// Mid-session query after more rolls must use the new denominator.
		agg.record_roll(vec![]);
		agg.record_roll(vec![]);
		agg.record_roll(vec![]);
		let late = agg.snapshot();
		assert!((late.stats[0].probability(late.total_rolls) - 25.0).abs() < 1e-9);
	}

	#[test]
	fn sort_is_count_desc_with_first_observed_ties() {
		let mut agg = ModAggregator::new(Language::English);
		agg.record_roll(vec![obs("mana", 7), obs("life", 30)]);
		agg.record_roll(vec![obs("es", 9), obs("es", 11)]);

		let keys: Vec<_> = agg.snapshot().stats.into_iter().map(|s| s.key).collect();
		// es has count 2; mana and life tie at 1 in observation order.
		assert_eq!(keys, ["es", "mana", "life"]);
	}

	#[test]
	fn last_roll_reflects_latest_attempt_only() {
		let mut agg = ModAggregator::new(Language::English);
		agg.record_roll(vec![obs("life", 90)]);
		agg.record_roll(vec![obs("mana", 12)]);
		assert_eq!(agg.last_roll(), [obs("mana", 12)]);

		agg.record_roll(vec![]);
		assert!(agg.last_roll().is_empty());
	}
}

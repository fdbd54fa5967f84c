//! The crafting session aggregate and its lifecycle state.
//!
//! A `CraftSession` is created on start, mutated exclusively by the engine
//! actor, and retained after stop so the dashboard can keep showing the
//! final statistics until the next start.

use std::time::Instant;

use mods::{Language, ModAggregator, ModStat, TargetMod};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Countdown,
    Running,
    Paused,
    Stopped,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Countdown => "countdown",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Outcome of one processed item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    pub item_number: u32,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_mod_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A mod stat plus its derived probability, materialized for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct ModStatView {
    #[serde(flatten)]
    pub stat: ModStat,
    /// `count / totalRolls * 100`, computed at read time.
    pub probability: f64,
}

#[derive(Debug)]
pub struct CraftSession {
    pub started_at: Instant,
    pub started_at_utc: OffsetDateTime,
    pub item_number: u32,
    pub attempt_num: u32,
    pub max_attempts_for_item: u32,
    pub aggregator: ModAggregator,
    pub target_mods: Vec<TargetMod>,
    pub round_history: Vec<RoundRecord>,
    /// First target hit, as `(description, value)`.
    pub target_hit: Option<(String, i64)>,
}

impl CraftSession {
    pub fn new(language: Language, target_mods: Vec<TargetMod>, max_attempts_for_item: u32) -> Self {
        Self {
            started_at: Instant::now(),
            started_at_utc: OffsetDateTime::now_utc(),
            item_number: 0,
            attempt_num: 0,
            max_attempts_for_item,
            aggregator: ModAggregator::new(language),
            target_mods,
            round_history: Vec::new(),
            target_hit: None,
        }
    }

    /// Rolls per minute over elapsed wall time since session start.
    pub fn rolls_per_min(&self) -> f64 {
        let minutes = self.started_at.elapsed().as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            return 0.0;
        }
        self.aggregator.total_rolls() as f64 / minutes
    }

    pub fn stats_view(&self) -> Vec<ModStatView> {
        let snap = self.aggregator.snapshot();
        snap.stats
            .into_iter()
            .map(|stat| {
                let probability = stat.probability(snap.total_rolls);
                ModStatView { stat, probability }
            })
            .collect()
    }

    /// Final report, built once when the session ends.
    pub fn report(&self) -> SessionReport {
        let fmt = |t: OffsetDateTime| t.format(&Rfc3339).unwrap_or_else(|_| "unknown".to_string());
        let elapsed = self.started_at.elapsed();

        SessionReport {
            start_time: fmt(self.started_at_utc),
            end_time: fmt(OffsetDateTime::now_utc()),
            duration_secs: elapsed.as_secs(),
            total_rolls: self.aggregator.total_rolls(),
            rolls_per_min: self.rolls_per_min(),
            target_mods: self.target_mods.iter().map(|t| t.description.clone()).collect(),
            target_mod_hit: self.target_hit.is_some(),
            target_mod_name: self.target_hit.as_ref().map(|(name, _)| name.clone()),
            target_value: self.target_hit.as_ref().map(|&(_, value)| value),
            mod_stats: self.stats_view(),
            round_results: self.round_history.clone(),
        }
    }
}

/// Emitted with `session_ended`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: u64,
    pub total_rolls: u64,
    pub rolls_per_min: f64,
    pub target_mods: Vec<String>,
    pub target_mod_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_mod_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_value: Option<i64>,
    pub mod_stats: Vec<ModStatView>,
    pub round_results: Vec<RoundRecord>,
}

/// Point-in-time answer to a status query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub state: SessionState,
    pub item_number: u32,
    pub attempt_num: u32,
    pub max_attempts: u32,
    pub total_rolls: u64,
    pub rolls_per_min: f64,
    pub target_mods: Vec<TargetMod>,
    pub mod_stats: Vec<ModStatView>,
    pub round_history: Vec<RoundRecord>,
}

impl StatusSnapshot {
    pub fn idle(state: SessionState) -> Self {
        Self {
            state,
            item_number: 0,
            attempt_num: 0,
            max_attempts: 0,
            total_rolls: 0,
            rolls_per_min: 0.0,
            target_mods: Vec::new(),
            mod_stats: Vec::new(),
            round_history: Vec::new(),
        }
    }
}

//! Persistent crafter configuration.
//!
//! Stored as JSON in a platform-appropriate config directory. The engine
//! never reads this live: it takes a validated [`RunConfig`] snapshot at
//! session start and treats it as immutable for the session's duration.

use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Context, Result};
use grid::{GridCalibration, Point, Rect};
use mods::{Language, TargetMod};
use serde::{Deserialize, Serialize};

use crate::error::CraftError;

/// A cell address on the logical stash grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

/// A rectangle of grid cells (top-left address plus extent).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellArea {
    pub row: u32,
    pub col: u32,
    pub rows: u32,
    pub cols: u32,
}

/// On-disk configuration. Every field round-trips losslessly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Two-corner calibration of the stash grid.
    pub grid: GridCalibration,

    /// Pixel position of the consumable stack.
    pub consumable_pos: Point,

    /// Item footprint in cells (1×1 for rings, 2×3 for armours, ...).
    pub item_width: u32,
    pub item_height: u32,

    /// Anchor cell the item sits on while being rolled.
    pub workbench: CellAddress,

    /// Where unprocessed items wait and where finished items go.
    pub pending_area: CellArea,
    pub result_area: CellArea,

    /// Tooltip rectangle relative to the workbench anchor. Derived from a
    /// captured rectangle via `grid::tooltip_anchor_offset`; recomputed
    /// against the current anchor at every session start.
    pub tooltip_offset: Point,
    pub tooltip_size: Point,

    /// Consumables to spend per item before giving up on it.
    pub rolls_per_item: u32,

    /// Delay between rolls, milliseconds.
    pub roll_delay_ms: u64,

    /// Driver call budgets, milliseconds.
    pub capture_timeout_ms: u64,
    pub input_timeout_ms: u64,

    /// Acceptance rules. Entered for `game_language`; switching the
    /// language requires re-entering them (keys survive, matchers don't).
    pub target_mods: Vec<TargetMod>,

    pub game_language: Language,

    pub debug: bool,
    pub save_snapshots: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid: GridCalibration::default(),
            consumable_pos: Point::ORIGIN,
            item_width: 1,
            item_height: 1,
            workbench: CellAddress::default(),
            pending_area: CellArea::default(),
            result_area: CellArea::default(),
            tooltip_offset: Point::ORIGIN,
            tooltip_size: Point::ORIGIN,
            rolls_per_item: 10,
            roll_delay_ms: 500,
            capture_timeout_ms: 5_000,
            input_timeout_ms: 3_000,
            target_mods: Vec::new(),
            game_language: Language::English,
            debug: false,
            save_snapshots: false,
        }
    }
}

impl Config {
    /// Path to the config file.
    pub fn path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("config_dir() unavailable")?;
        Ok(base.join("crafter.json"))
    }

    fn try_load() -> Result<Option<Self>> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).with_context(|| format!("read {path:?}"))?;
        let cfg = serde_json::from_str(&json).with_context(|| format!("parse {path:?}"))?;
        Ok(Some(cfg))
    }
}

/// Shared handle to the current configuration.
///
/// Disk-backed in the binary; in-memory for tests. Mutation only happens
/// through `set`, which persists before publishing.
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Option<Config>>,
}

impl ConfigStore {
    pub fn on_disk() -> Result<Self> {
        let path = Config::path()?;
        let current = match Config::try_load() {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load config; starting unconfigured");
                None
            }
        };
        Ok(Self { path: Some(path), current: RwLock::new(current) })
    }

    pub fn in_memory(cfg: Option<Config>) -> Self {
        Self { path: None, current: RwLock::new(cfg) }
    }

    pub fn get(&self) -> Option<Config> {
        self.current.read().expect("config lock poisoned").clone()
    }

    pub fn set(&self, cfg: Config) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| format!("create {parent:?}"))?;
            }
            let json = serde_json::to_string_pretty(&cfg).context("serialize config")?;
            fs::write(path, json).with_context(|| format!("write {path:?}"))?;
        }
        *self.current.write().expect("config lock poisoned") = Some(cfg);
        Ok(())
    }
}

/// Validated, immutable per-session snapshot of the configuration.
///
/// All grid math happens here, once, so the roll loop works with plain
/// pixel positions.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub consumable_px: Point,
    pub workbench_px: Point,
    pub tooltip_rect: Rect,
    /// Pixel centers of item slots, row-major over each area.
    pub pending_slots: Vec<Point>,
    pub result_slots: Vec<Point>,
    pub rolls_per_item: u32,
    pub roll_delay: Duration,
    pub capture_timeout: Duration,
    pub input_timeout: Duration,
    pub targets: Vec<TargetMod>,
    pub language: Language,
    pub save_snapshots: bool,
}

impl RunConfig {
    pub fn from_config(cfg: &Config) -> Result<Self, CraftError> {
        if !cfg.grid.is_set() {
            return Err(CraftError::Uncalibrated("stash grid corners not captured".into()));
        }
        if cfg.grid.cell_center(0, 0).is_none() {
            return Err(CraftError::Uncalibrated("stash grid corners are degenerate".into()));
        }
        if cfg.tooltip_size.x <= 0 || cfg.tooltip_size.y <= 0 {
            return Err(CraftError::Uncalibrated("tooltip rectangle not captured".into()));
        }
        if cfg.consumable_pos == Point::ORIGIN {
            return Err(CraftError::Uncalibrated("consumable position not captured".into()));
        }
        if cfg.item_width == 0 || cfg.item_height == 0 {
            return Err(CraftError::Config("item size must be at least 1×1 cells".into()));
        }
        if cfg.rolls_per_item == 0 {
            return Err(CraftError::Config("rollsPerItem must be positive".into()));
        }
        if cfg.target_mods.is_empty() {
            return Err(CraftError::Config("no target mods configured".into()));
        }
        if let Some(stale) = cfg.target_mods.iter().find(|t| t.game_language != cfg.game_language) {
            // Canonical keys survive a language switch but the matcher
            // dictionary does not; rules must be re-entered, not migrated.
            return Err(CraftError::Config(format!(
                "target mod '{}' was entered for language {}; re-enter target mods for {}",
                stale.key,
                stale.game_language.code(),
                cfg.game_language.code(),
            )));
        }

        let workbench_px = cfg
            .grid
            .cell_center(cfg.workbench.row, cfg.workbench.col)
            .ok_or_else(|| CraftError::Uncalibrated("workbench cell outside the grid".into()))?;

        let tooltip_min = workbench_px + cfg.tooltip_offset;
        let tooltip_rect = Rect::new(tooltip_min, tooltip_min + cfg.tooltip_size);

        let pending_slots = area_slots(cfg, cfg.pending_area, "pending")?;
        let result_slots = area_slots(cfg, cfg.result_area, "result")?;
        if pending_slots.is_empty() || result_slots.is_empty() {
            return Err(CraftError::Config(
                "pending/result areas too small for the configured item size".into(),
            ));
        }

        Ok(Self {
            consumable_px: cfg.consumable_pos,
            workbench_px,
            tooltip_rect,
            pending_slots,
            result_slots,
            rolls_per_item: cfg.rolls_per_item,
            roll_delay: Duration::from_millis(cfg.roll_delay_ms),
            capture_timeout: Duration::from_millis(cfg.capture_timeout_ms),
            input_timeout: Duration::from_millis(cfg.input_timeout_ms),
            targets: cfg.target_mods.clone(),
            language: cfg.game_language,
            save_snapshots: cfg.debug || cfg.save_snapshots,
        })
    }

    /// Items the batch can process: bounded by both areas.
    pub fn batch_capacity(&self) -> usize {
        self.pending_slots.len().min(self.result_slots.len())
    }
}

/// Anchor-cell pixel centers for every item slot in an area, row-major.
fn area_slots(cfg: &Config, area: CellArea, what: &str) -> Result<Vec<Point>, CraftError> {
    let mut slots = Vec::new();
    let mut row = area.row;
    while row + cfg.item_height <= area.row + area.rows {
        let mut col = area.col;
        while col + cfg.item_width <= area.col + area.cols {
            let center = cfg.grid.cell_center(row, col).ok_or_else(|| {
                CraftError::Uncalibrated(format!("{what} area extends outside the grid"))
            })?;
            slots.push(center);
            col += cfg.item_width;
        }
        row += cfg.item_height;
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibrated() -> Config {
        Config {
            grid: GridCalibration::new(Point::new(100, 200), Point::new(820, 500)),
            consumable_pos: Point::new(50, 60),
            workbench: CellAddress { row: 0, col: 0 },
            pending_area: CellArea { row: 1, col: 0, rows: 2, cols: 3 },
            result_area: CellArea { row: 3, col: 0, rows: 2, cols: 3 },
            tooltip_offset: Point::new(40, -10),
            tooltip_size: Point::new(300, 200),
            target_mods: vec![mods::parse_target_mod("life 80", Language::English).unwrap()],
            ..Config::default()
        }
    }

    #[test]
    fn config_round_trips_losslessly() {
        let cfg = calibrated();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn uncalibrated_grid_is_refused() {
        let cfg = Config { grid: GridCalibration::default(), ..calibrated() };
        assert!(matches!(RunConfig::from_config(&cfg), Err(CraftError::Uncalibrated(_))));
    }

    #[test]
    fn language_switch_requires_reentry() {
        let cfg = Config { game_language: Language::SimplifiedChinese, ..calibrated() };
        let err = RunConfig::from_config(&cfg).unwrap_err();
        assert!(matches!(err, CraftError::Config(_)));
        assert!(err.to_string().contains("re-enter"));
    }

    #[test]
    fn tooltip_rect_follows_workbench_anchor() {
        let mut cfg = calibrated();
        let a = RunConfig::from_config(&cfg).unwrap();
        cfg.workbench = CellAddress { row: 2, col: 5 };
        let b = RunConfig::from_config(&cfg).unwrap();
        // Same offset, different anchor: the absolute rect must move.
        assert_ne!(a.tooltip_rect, b.tooltip_rect);
        assert_eq!(a.tooltip_rect.size(), b.tooltip_rect.size());
    }

    #[test]
    fn slot_layout_respects_item_footprint() {
        let cfg = Config { item_width: 1, item_height: 2, ..calibrated() };
        let run = RunConfig::from_config(&cfg).unwrap();
        // 2-row areas fit one 1×2 item per column.
        assert_eq!(run.pending_slots.len(), 3);
        assert_eq!(run.batch_capacity(), 3);
    }
}

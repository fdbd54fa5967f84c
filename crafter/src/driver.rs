//! Side-effect seams: mouse/keyboard input and tooltip text capture.
//!
//! Both traits are synchronous; the engine wraps every call in
//! `spawn_blocking` plus a timeout so a wedged driver costs one item, not
//! the session. Real implementations talk to the OS; [`SimDriver`] replays
//! a script for tests and headless runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use grid::{Point, Rect};
use mods::Language;

/// Drives clicks and drags in screen coordinates.
pub trait InputDriver: Send + Sync {
    /// Apply one consumable from `orb` onto the item at `item`.
    fn apply_consumable(&self, orb: Point, item: Point) -> Result<()>;

    /// Move the item occupying `from` to `to`.
    fn move_item(&self, from: Point, to: Point) -> Result<()>;

    /// Current pointer position, used by the calibration wizard.
    fn cursor_position(&self) -> Result<Point>;
}

/// Reads the text shown in a screen region.
pub trait TooltipReader: Send + Sync {
    fn read_region(&self, region: Rect, language: Language) -> Result<String>;
}

/// One recorded [`SimDriver`] input action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimAction {
    ApplyConsumable { orb: Point, item: Point },
    MoveItem { from: Point, to: Point },
}

/// Scripted driver: hands out queued tooltip texts and records every input
/// action. Once the script runs dry, reads return an empty string, which
/// the parser treats as a roll with no recognized mods.
#[derive(Default)]
pub struct SimDriver {
    texts: Mutex<VecDeque<String>>,
    cursor: Mutex<Point>,
    actions: Mutex<Vec<SimAction>>,
}

impl SimDriver {
    pub fn scripted<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            texts: Mutex::new(texts.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn set_cursor(&self, p: Point) {
        *self.cursor.lock().expect("cursor lock poisoned") = p;
    }

    pub fn actions(&self) -> Vec<SimAction> {
        self.actions.lock().expect("actions lock poisoned").clone()
    }

    fn record(&self, action: SimAction) {
        self.actions.lock().expect("actions lock poisoned").push(action);
    }
}

impl InputDriver for SimDriver {
    fn apply_consumable(&self, orb: Point, item: Point) -> Result<()> {
        self.record(SimAction::ApplyConsumable { orb, item });
        Ok(())
    }

    fn move_item(&self, from: Point, to: Point) -> Result<()> {
        self.record(SimAction::MoveItem { from, to });
        Ok(())
    }

    fn cursor_position(&self) -> Result<Point> {
        Ok(*self.cursor.lock().expect("cursor lock poisoned"))
    }
}

impl TooltipReader for SimDriver {
    fn read_region(&self, _region: Rect, _language: Language) -> Result<String> {
        let mut texts = self.texts.lock().expect("texts lock poisoned");
        Ok(texts.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_driver_replays_script_then_runs_dry() {
        let sim = SimDriver::scripted(["+80 to maximum Life", "+30 to Strength"]);
        let region = Rect::new(Point::new(0, 0), Point::new(100, 100));
        assert_eq!(sim.read_region(region, Language::English).unwrap(), "+80 to maximum Life");
        assert_eq!(sim.read_region(region, Language::English).unwrap(), "+30 to Strength");
        assert_eq!(sim.read_region(region, Language::English).unwrap(), "");
    }

    #[test]
    fn sim_driver_records_actions_in_order() {
        let sim = SimDriver::default();
        let orb = Point::new(10, 10);
        let item = Point::new(50, 50);
        sim.apply_consumable(orb, item).unwrap();
        sim.move_item(item, Point::new(90, 90)).unwrap();
        assert_eq!(
            sim.actions(),
            [
                SimAction::ApplyConsumable { orb, item },
                SimAction::MoveItem { from: item, to: Point::new(90, 90) },
            ]
        );
    }
}

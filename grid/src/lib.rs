//! Screen-space geometry for the stash grid.
//!
//! The game lays items out on a fixed 5×12 cell grid. Calibration is two
//! pixel corners captured by the operator; everything else (cell centers,
//! tooltip anchors) is derived from them.

use serde::{Deserialize, Serialize};

/// Logical grid rows.
pub const ROWS: u32 = 5;
/// Logical grid columns.
pub const COLS: u32 = 12;

/// A pixel position in screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
	pub x: i32,
	pub y: i32,
}

impl Point {
	pub const ORIGIN: Self = Self { x: 0, y: 0 };

	pub const fn new(x: i32, y: i32) -> Self {
		Self { x, y }
	}
}

impl std::ops::Add for Point {
	type Output = Point;

	fn add(self, rhs: Point) -> Point {
		Point::new(self.x + rhs.x, self.y + rhs.y)
	}
}

impl std::ops::Sub for Point {
	type Output = Point;

	fn sub(self, rhs: Point) -> Point {
		Point::new(self.x - rhs.x, self.y - rhs.y)
	}
}

/// An axis-aligned pixel rectangle, `min` inclusive, `max` exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
	pub min: Point,
	pub max: Point,
}

impl Rect {
	pub const fn new(min: Point, max: Point) -> Self {
		Self { min, max }
	}

	pub fn size(&self) -> Point {
		self.max - self.min
	}

	pub fn is_empty(&self) -> bool {
		self.max.x <= self.min.x || self.max.y <= self.min.y
	}
}

/// Two-corner calibration of the stash grid.
///
/// Both corners at the origin means "not calibrated". An uncalibrated or
/// degenerate grid never maps anything; callers get `None` instead of a
/// bogus pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCalibration {
	pub top_left: Point,
	pub bottom_right: Point,
}

impl GridCalibration {
	pub const fn new(top_left: Point, bottom_right: Point) -> Self {
		Self { top_left, bottom_right }
	}

	/// Whether the operator has captured both corners.
	pub fn is_set(&self) -> bool {
		!(self.top_left == Point::ORIGIN && self.bottom_right == Point::ORIGIN)
	}

	/// Cell size in pixels, or `None` when unset or degenerate.
	fn cell_size(&self) -> Option<(f64, f64)> {
		if !self.is_set() {
			return None;
		}
		let w = f64::from(self.bottom_right.x - self.top_left.x) / f64::from(COLS);
		let h = f64::from(self.bottom_right.y - self.top_left.y) / f64::from(ROWS);
		if w <= 0.0 || h <= 0.0 {
			return None;
		}
		Some((w, h))
	}

	/// Pixel center of cell `(row, col)`.
	///
	/// `None` for an unset/degenerate calibration or an out-of-bounds
	/// address.
	pub fn cell_center(&self, row: u32, col: u32) -> Option<Point> {
		if row >= ROWS || col >= COLS {
			return None;
		}
		let (cw, ch) = self.cell_size()?;
		let x = f64::from(self.top_left.x) + (f64::from(col) + 0.5) * cw;
		let y = f64::from(self.top_left.y) + (f64::from(row) + 0.5) * ch;
		Some(Point::new(x.round() as i32, y.round() as i32))
	}

	/// Nearest cell `(row, col)` for a pixel.
	///
	/// Results are clamped into grid bounds on both sides, so any on-screen
	/// pixel resolves to a usable cell. Inverse of [`cell_center`] up to
	/// rounding.
	///
	/// [`cell_center`]: GridCalibration::cell_center
	pub fn pixel_to_cell(&self, p: Point) -> Option<(u32, u32)> {
		let (cw, ch) = self.cell_size()?;
		let col = (f64::from(p.x - self.top_left.x) / cw).floor();
		let row = (f64::from(p.y - self.top_left.y) / ch).floor();
		let col = (col.max(0.0) as u32).min(COLS - 1);
		let row = (row.max(0.0) as u32).min(ROWS - 1);
		Some((row, col))
	}
}

/// Derive the tooltip offset and size from a captured tooltip rectangle.
///
/// `offset` is relative to the anchor (usually the workbench cell center)
/// and must be recomputed whenever the anchor moves; a stored offset for an
/// old anchor is stale.
pub fn tooltip_anchor_offset(anchor: Point, tooltip: Rect) -> (Point, Point) {
	(tooltip.min - anchor, tooltip.size())
}

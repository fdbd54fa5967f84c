//! Typed session events and the broadcast bus observers subscribe to.

use mods::ModStat;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::session::{SessionReport, SessionState};

/// One event on the session stream.
///
/// Serializes as `{"type": "<snake_case>", "data": {...}}`, which is the
/// wire envelope the dashboard consumes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    StateChange {
        state: SessionState,
    },
    #[serde(rename_all = "camelCase")]
    RollAttempted {
        attempt_num: u32,
        max_attempts: u32,
        total_rolls: u64,
        rolls_per_min: f64,
    },
    TooltipCaptured {
        /// Unix milliseconds.
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    ModsTracked {
        ocr_text: String,
        mod_stats: Vec<ModStat>,
        total_rolls: u64,
    },
    #[serde(rename_all = "camelCase")]
    TargetFound {
        mod_name: String,
        value: i64,
        attempt_num: u32,
        total_rolls: u64,
    },
    #[serde(rename_all = "camelCase")]
    ItemStarted {
        item_number: u32,
        pending_x: i32,
        pending_y: i32,
    },
    #[serde(rename_all = "camelCase")]
    ItemCompleted {
        item_number: u32,
        success: bool,
        result_x: i32,
        result_y: i32,
    },
    #[serde(rename_all = "camelCase")]
    SnapshotUpdated {
        filename: String,
        step_name: String,
        item_number: u32,
    },
    SessionEnded {
        report: SessionReport,
    },
    #[serde(rename_all = "camelCase")]
    CraftCountdown {
        seconds_left: u32,
    },
    #[serde(rename_all = "camelCase")]
    CaptureCountdown {
        seconds_left: u32,
        field: String,
    },
    CaptureResult {
        field: String,
        x: i32,
        y: i32,
    },
}

/// Multiplexed, ordered, append-only broadcast of [`Event`]s.
///
/// Backed by a bounded `tokio::sync::broadcast` channel: every subscriber
/// gets events in emission order, a subscriber that falls behind loses the
/// oldest entries (it sees `Lagged`, not a stalled engine), and emitting
/// with zero subscribers is a no-op. The craft loop never waits on
/// observers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire-and-forget emission.
    pub fn emit(&self, event: Event) {
        // Err means no subscriber is connected right now; that's fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

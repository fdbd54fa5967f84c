//! Error taxonomy for the crafting core.
//!
//! Control-surface callers receive these as structured reason strings;
//! none of them bring the orchestrator down.

use std::time::Duration;

use crate::session::SessionState;

#[derive(Debug, thiserror::Error)]
pub enum CraftError {
    /// `start` issued while a session is in countdown/running/paused.
    #[error("already running")]
    AlreadyRunning,

    /// A control command arrived in a state that does not accept it.
    /// Recoverable; the session state is left untouched.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },

    /// The capture subsystem did not answer in time. Aborts the current
    /// item, never the whole session.
    #[error("tooltip capture timed out after {0:?}")]
    CaptureTimeout(Duration),

    /// The input driver did not answer in time. Same scope as capture.
    #[error("input driver timed out after {0:?}")]
    InputTimeout(Duration),

    /// An operation needs a calibration value that is unset or degenerate.
    /// Refused before any side effect.
    #[error("not calibrated: {0}")]
    Uncalibrated(String),

    /// Configuration missing or unusable for a session start.
    #[error("{0}")]
    Config(String),

    /// Driver call failed outright (as opposed to timing out).
    #[error("driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// The session state machine reached an impossible combination. Should
    /// never happen; detection forces a reset to idle.
    #[error("internal session state corrupted: {0}")]
    Internal(&'static str),

    /// The engine task is gone (shutdown).
    #[error("engine unavailable")]
    Unavailable,
}

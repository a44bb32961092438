//! Timer notification seam to the presentation layer.

use serde::{Deserialize, Serialize};

/// Per-tick countdown snapshot pushed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerUpdate {
    /// Whole minutes elapsed since session start.
    pub elapsed_minutes: u64,
    /// Whole minutes remaining on the countdown.
    pub remaining_minutes: u64,
    /// Seconds remaining on the countdown.
    pub remaining_seconds: u64,
    /// Remaining time formatted as `MM:SS`.
    pub display: String,
}

/// Callback boundary through which timer ticks reach the presentation layer.
///
/// Invoked at most once per second while a session is active. Implementations
/// are responsible for verifying the bound window/presentation surface is
/// still alive before delivering the update; the controller never calls this
/// for a torn-down session.
pub trait NotificationSink: Send + Sync {
    fn timer_update(&self, update: TimerUpdate);
}

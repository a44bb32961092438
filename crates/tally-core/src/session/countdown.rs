//! Per-second countdown engine.
//!
//! Pure state: no timers, no I/O. The application layer drives `tick` once a
//! second and acts on the returned outcome. The countdown decrements a
//! counter initialized from the starting balance; remaining time is never
//! recomputed from wall-clock elapsed time.

use super::notify::TimerUpdate;

/// Seconds between balance sync attempts against the remote service.
pub const SYNC_INTERVAL_SECS: u64 = 30;

/// Whether a tick should trigger a server sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// The sync interval has not elapsed yet.
    NotDue,
    /// The interval elapsed but no whole minute has been used yet; the
    /// remote API rejects zero-minute updates, so the call is skipped.
    /// Still counts as an attempt for interval bookkeeping.
    Skip,
    /// Report `minutes_used` whole minutes to the remote service.
    Due { minutes_used: u64 },
}

/// Outcome of a single countdown tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// Snapshot for the presentation layer.
    pub update: TimerUpdate,
    /// The countdown budget is exhausted.
    pub expired: bool,
    /// Server sync decision for this tick.
    pub sync: SyncDecision,
}

/// Countdown state for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Countdown {
    remaining_seconds: u64,
    elapsed_seconds: u64,
    seconds_since_sync: u64,
}

impl Countdown {
    /// Creates a countdown with a budget of `starting_minutes * 60` seconds.
    /// Non-positive budgets start at zero and expire on the first tick.
    pub fn new(starting_minutes: f64) -> Self {
        let remaining_seconds = if starting_minutes > 0.0 {
            (starting_minutes * 60.0).floor() as u64
        } else {
            0
        };
        Self {
            remaining_seconds,
            elapsed_seconds: 0,
            seconds_since_sync: 0,
        }
    }

    /// Advances the countdown by one second.
    pub fn tick(&mut self) -> Tick {
        self.elapsed_seconds += 1;
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        self.seconds_since_sync += 1;

        let sync = if self.seconds_since_sync >= SYNC_INTERVAL_SECS {
            // Skip and Due both reset the interval: the cadence runs from the
            // last attempted sync, not the last successful one.
            self.seconds_since_sync = 0;
            match self.elapsed_minutes() {
                0 => SyncDecision::Skip,
                minutes_used => SyncDecision::Due { minutes_used },
            }
        } else {
            SyncDecision::NotDue
        };

        Tick {
            update: self.timer_update(),
            expired: self.remaining_seconds == 0,
            sync,
        }
    }

    /// Seconds remaining on the budget.
    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    /// Seconds ticked since the countdown was armed.
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    /// Whole minutes ticked since the countdown was armed.
    pub fn elapsed_minutes(&self) -> u64 {
        self.elapsed_seconds / 60
    }

    fn timer_update(&self) -> TimerUpdate {
        TimerUpdate {
            elapsed_minutes: self.elapsed_minutes(),
            remaining_minutes: self.remaining_seconds / 60,
            remaining_seconds: self.remaining_seconds,
            display: format!(
                "{:02}:{:02}",
                self.remaining_seconds / 60,
                self.remaining_seconds % 60
            ),
        }
    }
}

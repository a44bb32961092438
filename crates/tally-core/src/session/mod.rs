//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: session entity and lifecycle types (`Session`, `SessionStatus`,
//!   `SessionParams`, `SessionHandle`, `EndReason`)
//! - `countdown`: the pure per-second countdown engine
//! - `notify`: timer-update payload and the presentation-layer sink trait

mod countdown;
mod model;
mod notify;

// Re-export public API
pub use countdown::{Countdown, SyncDecision, Tick, SYNC_INTERVAL_SECS};
pub use model::{EndReason, Session, SessionHandle, SessionParams, SessionStatus};
pub use notify::{NotificationSink, TimerUpdate};

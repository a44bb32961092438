//! Session domain model.
//!
//! This module contains the core Session entity that represents one timed,
//! billed usage period in the application's domain layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::balance::SubscriptionTier;

/// Lifecycle status of a session.
///
/// `Active` transitions to exactly one of the terminal states; terminal
/// states are final and the session is not mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    /// Ended by an explicit request from the presentation layer.
    Completed,
    /// Ended because the countdown or the remote balance reached zero.
    Expired,
}

/// Why a session is being terminated. Maps onto the terminal
/// `SessionStatus` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Completed,
    Expired,
}

impl From<EndReason> for SessionStatus {
    fn from(reason: EndReason) -> Self {
        match reason {
            EndReason::Completed => SessionStatus::Completed,
            EndReason::Expired => SessionStatus::Expired,
        }
    }
}

/// Caller-supplied context for a new session, forwarded opaquely to the
/// remote service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    pub company: String,
    pub position: String,
    pub session_type: String,
}

/// Represents one timed usage period billed against the user's
/// remaining-minutes balance.
///
/// The identifier starts as a locally generated placeholder and is replaced
/// by the server-issued identifier once the gateway acknowledges creation.
/// Exactly one session identifier is current at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier (local placeholder or server-issued).
    pub id: String,
    /// Wall-clock creation time; immutable for the session's lifetime.
    pub started_at: DateTime<Utc>,
    /// Subscription tier the session runs under.
    pub tier: SubscriptionTier,
    /// Remaining-balance snapshot taken at session start, in minutes.
    pub starting_minutes: f64,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Caller-supplied session context.
    pub params: SessionParams,
}

impl Session {
    /// Creates a new active session with a locally generated placeholder id.
    pub fn new(tier: SubscriptionTier, starting_minutes: f64, params: SessionParams) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            tier,
            starting_minutes,
            status: SessionStatus::Active,
            params,
        }
    }

    /// Whole seconds elapsed since the session started, floored at zero.
    pub fn elapsed_wall_clock_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.started_at).num_seconds().max(0) as u64
    }
}

/// Handle to a running session, carried by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
}

impl From<&Session> for SessionHandle {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            started_at: session.started_at,
        }
    }
}

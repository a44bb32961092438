//! Remote session gateway trait.
//!
//! Defines the boundary through which all remote balance and session
//! operations are invoked. The concrete HTTP implementation lives in the
//! gateway crate; the controller only ever sees this trait, which is what
//! makes the countdown testable against mocks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::balance::UserBalance;
use crate::error::Result;
use crate::session::SessionStatus;

/// Request to create a session on the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub company: String,
    pub position: String,
    pub session_type: String,
}

/// Server acknowledgement of session creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    /// Server-issued session identifier, replacing the local placeholder.
    pub session_id: String,
}

/// Periodic usage report for a running session.
///
/// `minutes_used` must be positive; the remote API rejects zero-minute
/// updates with a validation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeSyncRequest {
    pub session_id: String,
    pub minutes_used: u64,
}

/// Remaining balance reported back by a realtime sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedBalance {
    pub remaining_minutes: f64,
}

/// Final usage report sent when a session terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeSessionRequest {
    pub session_id: String,
    /// Whole minutes billed, floored at 1 (remote validation requires a
    /// non-zero charge).
    pub minutes_used: u64,
    pub duration_seconds: u64,
    pub ended_at: DateTime<Utc>,
    pub status: SessionStatus,
}

/// Transcript upload for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTranscriptRequest {
    pub session_id: String,
    pub transcript: String,
}

/// The abstract boundary for all remote balance/session operations.
///
/// # Failure modes
///
/// - `Auth`: no valid token; propagate up to force re-login.
/// - `Network`: transport failure; callers keep last known good local state.
/// - `Validation`: malformed request (e.g. zero-minute charge).
/// - `Permission`: insufficient balance at finalize time; treated by the
///   controller as a successful local termination.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Fetches the current remaining-minutes balance for the signed-in user.
    async fn fetch_user_balance(&self) -> Result<UserBalance>;

    /// Creates a session on the remote service. Callers must tolerate
    /// failure by continuing offline with the local identifier.
    async fn create_session(&self, request: CreateSessionRequest) -> Result<CreatedSession>;

    /// Reports elapsed usage for a running session and returns the
    /// server-side remaining balance.
    async fn sync_realtime(&self, request: RealtimeSyncRequest) -> Result<SyncedBalance>;

    /// Sends the final usage report for a terminating session.
    async fn finalize_session(&self, request: FinalizeSessionRequest) -> Result<()>;

    /// Uploads the transcript captured during a session.
    async fn save_transcript(&self, request: SaveTranscriptRequest) -> Result<()>;
}

//! Persisted application state model.

use serde::{Deserialize, Serialize};

/// The flat settings record surviving process restarts.
///
/// Two keys only: the cached remaining-balance float and the opaque
/// authenticated-session token blob. Absence of a key is the only schema
/// concern; there is no versioning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Last server-reported remaining balance, in minutes. Overwritten only
    /// by a successful sync response or the tier-based default installed
    /// when the initial balance fetch fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_balance_minutes: Option<f64>,

    /// Opaque authenticated-session token blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

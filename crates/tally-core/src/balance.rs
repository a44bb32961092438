//! Subscription tier and balance types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription class of the signed-in user.
///
/// The tier changes the fallback countdown budget and whether the balance
/// snapshot taken at session start is persisted across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Paid,
}

impl SubscriptionTier {
    /// Fallback countdown budget in minutes when the initial balance fetch
    /// fails and no cached balance is available.
    pub fn default_minutes(&self) -> f64 {
        match self {
            SubscriptionTier::Free => 10.0,
            SubscriptionTier::Paid => 0.0,
        }
    }
}

impl Default for SubscriptionTier {
    fn default() -> Self {
        SubscriptionTier::Free
    }
}

/// Remaining-balance snapshot returned by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBalance {
    /// Remaining minutes on the account.
    pub remaining_minutes: f64,
    /// Subscription tier as reported by the server.
    pub subscription_tier: SubscriptionTier,
    /// When the free-tier minute allowance resets, if the server tracks one.
    pub free_minutes_reset_at: Option<DateTime<Utc>>,
}

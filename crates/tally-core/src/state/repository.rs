//! State repository trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::state::model::PersistedState;

/// Repository for the persisted settings record.
///
/// Single-writer discipline: the countdown controller writes the cached
/// balance (during sync and startup fallback); the authentication component
/// clears it on logout or new login. No other writers exist.
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Returns the whole persisted record.
    async fn get_state(&self) -> Result<PersistedState>;

    /// Gets the cached remaining balance, in minutes.
    async fn get_cached_balance(&self) -> Option<f64>;

    /// Overwrites the cached remaining balance.
    async fn set_cached_balance(&self, minutes: f64) -> Result<()>;

    /// Clears the cached remaining balance.
    async fn clear_cached_balance(&self) -> Result<()>;

    /// Gets the stored authenticated-session token blob.
    async fn get_auth_token(&self) -> Option<String>;

    /// Stores the authenticated-session token blob.
    async fn set_auth_token(&self, token: String) -> Result<()>;

    /// Clears the stored token.
    async fn clear_auth_token(&self) -> Result<()>;
}

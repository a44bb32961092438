//! Authentication-token custody.
//!
//! The token blob arrives through the protocol-URL login handoff (outside
//! this crate) and is held in the persisted settings record. This service
//! owns storing and clearing it, and both login and logout tear down any
//! running countdown and clear the cached balance so one user's minutes
//! never leak into another's session.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use tally_core::balance::SubscriptionTier;
use tally_core::error::Result;
use tally_core::state::StateRepository;
use tally_core::token;

use crate::session::SessionCountdownController;

/// Service for authenticated-session token custody.
pub struct AuthService {
    state: Arc<dyn StateRepository>,
    controller: SessionCountdownController,
}

impl AuthService {
    pub fn new(state: Arc<dyn StateRepository>, controller: SessionCountdownController) -> Self {
        Self { state, controller }
    }

    /// Stores the token for a fresh login.
    ///
    /// Cancels any running countdown and clears the cached balance first; a
    /// new login must not inherit the previous user's countdown.
    pub async fn login(&self, token: impl Into<String>) -> Result<()> {
        self.controller.cancel_all().await;
        self.state.set_auth_token(token.into()).await?;
        tracing::info!("[AuthService] login token stored");
        Ok(())
    }

    /// Clears the stored token, cancels any running countdown, and clears
    /// the cached balance.
    pub async fn logout(&self) -> Result<()> {
        self.controller.cancel_all().await;
        self.state.clear_auth_token().await?;
        tracing::info!("[AuthService] logged out");
        Ok(())
    }

    /// Tier from the stored token's signed claim. `Free` on a missing token
    /// or a failed claims extraction; the failure is logged, not swallowed
    /// silently.
    pub async fn subscription_tier(&self) -> SubscriptionTier {
        let Some(token) = self.state.get_auth_token().await else {
            return SubscriptionTier::Free;
        };
        match token::parse_claims(&token) {
            Ok(claims) => claims.subscription_tier(),
            Err(e) => {
                tracing::warn!("[AuthService] tier claim extraction failed: {}", e);
                SubscriptionTier::Free
            }
        }
    }

    /// Whether a token is stored and not past its expiry claim.
    pub async fn has_valid_token(&self, now: DateTime<Utc>) -> bool {
        match self.state.get_auth_token().await {
            Some(token) => token::parse_claims(&token)
                .map(|claims| !claims.is_expired(now))
                .unwrap_or(false),
            None => false,
        }
    }
}

//! Typed parsing of the authenticated-session token.
//!
//! The token is a JWT issued by the backend during the protocol-URL login
//! handoff. Only the payload segment is read here; signature verification
//! belongs to the server. Malformed input yields a typed `Auth` error rather
//! than falling through to a default tier.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::balance::SubscriptionTier;
use crate::error::{Result, TallyError};

/// Claims carried in the token payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user identifier).
    #[serde(default)]
    pub sub: Option<String>,
    /// Account email, when the issuer includes it.
    #[serde(default)]
    pub email: Option<String>,
    /// Plan name claim, e.g. "free", "paid", "pro".
    #[serde(default)]
    pub plan: Option<String>,
    /// Expiry as a unix timestamp in seconds.
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TokenClaims {
    /// Maps the plan claim onto a subscription tier.
    ///
    /// Paid-family plan names map to `Paid`; everything else, including an
    /// absent claim, maps to `Free`.
    pub fn subscription_tier(&self) -> SubscriptionTier {
        match self.plan.as_deref() {
            Some("paid") | Some("pro") | Some("premium") => SubscriptionTier::Paid,
            _ => SubscriptionTier::Free,
        }
    }

    /// Whether the `exp` claim is in the past. Tokens without `exp` are
    /// treated as unexpired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.exp {
            Some(exp) => exp <= now.timestamp(),
            None => false,
        }
    }
}

/// Parses the payload segment of a JWT-format token into typed claims.
///
/// # Errors
///
/// Returns `TallyError::Auth` when the token does not have three segments,
/// the payload is not valid base64url, or the payload is not the expected
/// JSON object.
pub fn parse_claims(token: &str) -> Result<TokenClaims> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) if segments.next().is_none() => payload,
        _ => return Err(TallyError::auth("token is not in three-segment JWT format")),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| TallyError::auth(format!("token payload is not valid base64url: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| TallyError::auth(format!("token payload is not a claims object: {}", e)))
}

//! HttpSessionGateway - REST implementation of the session gateway.
//!
//! Talks to the billing/session backend over HTTPS. The bearer token is read
//! from the state repository on every request, so a token refreshed by the
//! login handoff is picked up without rebuilding the gateway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use tally_core::balance::{SubscriptionTier, UserBalance};
use tally_core::error::{Result, TallyError};
use tally_core::gateway::{
    CreateSessionRequest, CreatedSession, FinalizeSessionRequest, RealtimeSyncRequest,
    SaveTranscriptRequest, SessionGateway, SyncedBalance,
};
use tally_core::session::SessionStatus;
use tally_core::state::StateRepository;

const DEFAULT_BASE_URL: &str = "https://api.usetally.app";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway implementation that talks to the billing/session HTTP API.
#[derive(Clone)]
pub struct HttpSessionGateway {
    client: Client,
    base_url: String,
    state: Arc<dyn StateRepository>,
}

// ============================================================================
// Wire DTOs (camelCase to match the backend)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResponse {
    remaining_minutes: f64,
    subscription_tier: SubscriptionTier,
    #[serde(default)]
    free_minutes_reset_at: Option<DateTime<Utc>>,
}

impl From<BalanceResponse> for UserBalance {
    fn from(body: BalanceResponse) -> Self {
        Self {
            remaining_minutes: body.remaining_minutes,
            subscription_tier: body.subscription_tier,
            free_minutes_reset_at: body.free_minutes_reset_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeBody {
    minutes_used: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeResponse {
    remaining_minutes: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeBody {
    minutes_used: u64,
    duration_seconds: u64,
    ended_at: DateTime<Utc>,
    status: SessionStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptBody {
    transcript: String,
}

impl HttpSessionGateway {
    /// Creates a gateway against the production endpoint.
    pub fn new(state: Arc<dyn StateRepository>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TallyError::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            state,
        })
    }

    /// Overrides the base URL after construction (staging, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn bearer_token(&self) -> Result<String> {
        self.state
            .get_auth_token()
            .await
            .ok_or_else(|| TallyError::auth("no authenticated session token is stored"))
    }

    /// Resolves a response into either itself (2xx) or the error taxonomy.
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, &body))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Maps a non-success HTTP status onto the gateway error taxonomy.
fn error_for_status(status: StatusCode, body: &str) -> TallyError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };
    match status {
        StatusCode::UNAUTHORIZED => TallyError::auth(detail),
        StatusCode::PAYMENT_REQUIRED | StatusCode::FORBIDDEN => TallyError::permission(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            TallyError::validation(detail)
        }
        _ => TallyError::network(detail),
    }
}

fn transport_error(err: reqwest::Error) -> TallyError {
    TallyError::network(err.to_string())
}

#[async_trait]
impl SessionGateway for HttpSessionGateway {
    async fn fetch_user_balance(&self) -> Result<UserBalance> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .get(self.url("/api/users/balance"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check_status(response).await?;
        let body: BalanceResponse = response.json().await.map_err(transport_error)?;
        tracing::debug!(
            "[HttpSessionGateway] balance fetched: {:.1} minutes remaining",
            body.remaining_minutes
        );
        Ok(body.into())
    }

    async fn create_session(&self, request: CreateSessionRequest) -> Result<CreatedSession> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(self.url("/api/sessions"))
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check_status(response).await?;
        let body: CreateSessionResponse = response.json().await.map_err(transport_error)?;
        Ok(CreatedSession {
            session_id: body.session_id,
        })
    }

    async fn sync_realtime(&self, request: RealtimeSyncRequest) -> Result<SyncedBalance> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(self.url(&format!("/api/sessions/{}/realtime", request.session_id)))
            .bearer_auth(&token)
            .json(&RealtimeBody {
                minutes_used: request.minutes_used,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check_status(response).await?;
        let body: RealtimeResponse = response.json().await.map_err(transport_error)?;
        Ok(SyncedBalance {
            remaining_minutes: body.remaining_minutes,
        })
    }

    async fn finalize_session(&self, request: FinalizeSessionRequest) -> Result<()> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(self.url(&format!("/api/sessions/{}/finalize", request.session_id)))
            .bearer_auth(&token)
            .json(&FinalizeBody {
                minutes_used: request.minutes_used,
                duration_seconds: request.duration_seconds,
                ended_at: request.ended_at,
                status: request.status,
            })
            .send()
            .await
            .map_err(transport_error)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn save_transcript(&self, request: SaveTranscriptRequest) -> Result<()> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(self.url(&format!("/api/sessions/{}/transcript", request.session_id)))
            .bearer_auth(&token)
            .json(&TranscriptBody {
                transcript: request.transcript,
            })
            .send()
            .await
            .map_err(transport_error)?;
        Self::check_status(response).await?;
        Ok(())
    }
}

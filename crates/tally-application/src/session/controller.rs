//! Session countdown controller.
//!
//! Drives a per-second countdown from session start to natural expiry or
//! explicit termination, keeping the remote balance approximately consistent
//! while tolerating gateway failures and redundant teardown calls.
//!
//! Lifecycle: `Idle → Active → Terminating → Idle`. A tick is only valid in
//! the `Active` state and for the session binding recorded when that state
//! was entered; a tick that fails the binding check stops its timer without
//! touching state. Only two things terminate a session: the local countdown
//! reaching zero, and the gateway reporting a non-positive remaining
//! balance.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use tally_core::balance::SubscriptionTier;
use tally_core::error::{Result, TallyError};
use tally_core::gateway::{
    CreateSessionRequest, FinalizeSessionRequest, RealtimeSyncRequest, SaveTranscriptRequest,
    SessionGateway,
};
use tally_core::session::{
    Countdown, EndReason, NotificationSink, Session, SessionHandle, SessionParams, SyncDecision,
};
use tally_core::state::StateRepository;
use tally_core::token;

/// Countdown and sync state for the one running session.
struct ActiveSession {
    session: Session,
    countdown: Countdown,
    /// Cancels the timer task on teardown.
    cancel: CancellationToken,
    /// Identity the timer task is bound to. Stays fixed for the lifetime of
    /// the activation even when `session.id` is later replaced by a
    /// server-issued identifier.
    binding: String,
    /// Whether the remote service has acknowledged session creation.
    /// Billing sync is skipped until it has; the sync slot retries creation
    /// instead.
    server_acknowledged: bool,
}

enum Phase {
    Idle,
    Active(Box<ActiveSession>),
    /// Teardown in flight: the timer is cancelled and the session has been
    /// taken out for finalization.
    Terminating,
}

struct ControllerState {
    phase: Phase,
}

/// Owns session identity, start time, the remaining-time countdown, periodic
/// server synchronization, and termination.
///
/// An explicit owned object, constructed per presentation surface and passed
/// by reference; never a module-level singleton.
#[derive(Clone)]
pub struct SessionCountdownController {
    gateway: Arc<dyn SessionGateway>,
    state: Arc<dyn StateRepository>,
    sink: Arc<dyn NotificationSink>,
    inner: Arc<Mutex<ControllerState>>,
}

impl SessionCountdownController {
    pub fn new(
        gateway: Arc<dyn SessionGateway>,
        state: Arc<dyn StateRepository>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            gateway,
            state,
            sink,
            inner: Arc::new(Mutex::new(ControllerState { phase: Phase::Idle })),
        }
    }

    /// Starts a session and arms the 1-second countdown timer.
    ///
    /// Idempotent: if a session is already active, its existing handle is
    /// returned and no duplicate is created.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error when a previous teardown is still in
    /// flight. Gateway failures do not fail the start: a failed balance
    /// fetch falls back to the cached balance or the tier default, and a
    /// failed creation degrades to offline mode with the local identifier.
    pub async fn start_session(&self, params: SessionParams) -> Result<SessionHandle> {
        let mut inner = self.inner.lock().await;
        match &inner.phase {
            Phase::Active(active) => {
                tracing::debug!(
                    "[SessionCountdownController] start_session with session {} already active",
                    active.session.id
                );
                return Ok(SessionHandle::from(&active.session));
            }
            Phase::Terminating => {
                return Err(TallyError::validation(
                    "previous session is still shutting down",
                ));
            }
            Phase::Idle => {}
        }

        let tier = self.resolve_tier().await;
        let starting_minutes = self.resolve_starting_minutes(tier).await;

        let mut session = Session::new(tier, starting_minutes, params.clone());
        let server_acknowledged = match self
            .gateway
            .create_session(CreateSessionRequest {
                company: params.company,
                position: params.position,
                session_type: params.session_type,
            })
            .await
        {
            Ok(created) => {
                session.id = created.session_id;
                true
            }
            Err(e) => {
                tracing::warn!(
                    "[SessionCountdownController] session creation failed, continuing offline: {}",
                    e
                );
                false
            }
        };

        let handle = SessionHandle::from(&session);
        let binding = session.id.clone();
        let cancel = CancellationToken::new();

        tracing::info!(
            "[SessionCountdownController] session {} started: tier {:?}, {:.1} starting minutes",
            session.id,
            tier,
            starting_minutes
        );

        inner.phase = Phase::Active(Box::new(ActiveSession {
            session,
            countdown: Countdown::new(starting_minutes),
            cancel: cancel.clone(),
            binding: binding.clone(),
            server_acknowledged,
        }));
        drop(inner);

        self.spawn_timer(binding, cancel);
        Ok(handle)
    }

    /// Terminates the running session.
    ///
    /// Stops the timer before any other mutation, reports final usage to the
    /// gateway (floored at one billable minute), and unconditionally returns
    /// the controller to idle. A `Permission` failure from the gateway is an
    /// expected terminal condition and is treated as success. Idempotent:
    /// a call with no active session is a no-op.
    pub async fn end_session(&self, reason: EndReason) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.phase, Phase::Active(_)) {
            return Ok(());
        }

        // Stop the timer before any other mutation.
        if let Phase::Active(active) = &inner.phase {
            active.cancel.cancel();
        }
        let mut active = match std::mem::replace(&mut inner.phase, Phase::Terminating) {
            Phase::Active(active) => active,
            // Unreachable under the held lock; checked above.
            _ => return Ok(()),
        };
        drop(inner);

        active.session.status = reason.into();
        let ended_at = Utc::now();
        let duration_seconds = active.session.elapsed_wall_clock_seconds(ended_at);
        let minutes_used = (duration_seconds / 60).max(1);

        let request = FinalizeSessionRequest {
            session_id: active.session.id.clone(),
            minutes_used,
            duration_seconds,
            ended_at,
            status: active.session.status,
        };
        match self.gateway.finalize_session(request).await {
            Ok(()) => {
                tracing::info!(
                    "[SessionCountdownController] session {} finalized: {:?}, {} minute(s)",
                    active.session.id,
                    active.session.status,
                    minutes_used
                );
            }
            Err(e) if e.is_permission() => {
                tracing::info!(
                    "[SessionCountdownController] balance exhausted at finalize for session {}; ended locally",
                    active.session.id
                );
            }
            Err(e) => {
                tracing::warn!(
                    "[SessionCountdownController] finalize failed for session {}, ended locally: {}",
                    active.session.id,
                    e
                );
            }
        }

        let mut inner = self.inner.lock().await;
        inner.phase = Phase::Idle;
        Ok(())
    }

    /// Cancels the timer, discards session state, and clears the cached
    /// balance. Used on logout or before starting a session for a new login,
    /// so a fresh login does not inherit a stale user's countdown.
    pub async fn cancel_all(&self) {
        {
            let mut inner = self.inner.lock().await;
            if let Phase::Active(active) = &inner.phase {
                active.cancel.cancel();
            }
            inner.phase = Phase::Idle;
        }

        if let Err(e) = self.state.clear_cached_balance().await {
            tracing::warn!(
                "[SessionCountdownController] failed to clear cached balance: {}",
                e
            );
        }
    }

    /// Uploads a transcript for the currently active session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no session is active, or the gateway failure
    /// otherwise.
    pub async fn save_transcript(&self, transcript: impl Into<String>) -> Result<()> {
        let session_id = {
            let inner = self.inner.lock().await;
            match &inner.phase {
                Phase::Active(active) => active.session.id.clone(),
                _ => return Err(TallyError::not_found("Session", "current")),
            }
        };

        self.gateway
            .save_transcript(SaveTranscriptRequest {
                session_id,
                transcript: transcript.into(),
            })
            .await
    }

    /// Handle of the currently active session, if any.
    pub async fn active_session(&self) -> Option<SessionHandle> {
        let inner = self.inner.lock().await;
        match &inner.phase {
            Phase::Active(active) => Some(SessionHandle::from(&active.session)),
            _ => None,
        }
    }

    // ========================================================================
    // Session start helpers
    // ========================================================================

    /// Tier from the stored token's signed claim; `Free` on any extraction
    /// failure. The failure is typed and logged, never silently swallowed.
    async fn resolve_tier(&self) -> SubscriptionTier {
        let Some(token) = self.state.get_auth_token().await else {
            tracing::warn!("[SessionCountdownController] no stored token, assuming free tier");
            return SubscriptionTier::Free;
        };
        match token::parse_claims(&token) {
            Ok(claims) => claims.subscription_tier(),
            Err(e) => {
                tracing::warn!(
                    "[SessionCountdownController] tier claim extraction failed, assuming free tier: {}",
                    e
                );
                SubscriptionTier::Free
            }
        }
    }

    /// Balance snapshot for the countdown budget. On fetch failure the
    /// cached balance is used when present, else the tier default (which is
    /// also installed into the empty cache).
    async fn resolve_starting_minutes(&self, tier: SubscriptionTier) -> f64 {
        match self.gateway.fetch_user_balance().await {
            Ok(balance) => {
                if tier == SubscriptionTier::Paid {
                    if let Err(e) = self.state.set_cached_balance(balance.remaining_minutes).await
                    {
                        tracing::warn!(
                            "[SessionCountdownController] failed to cache starting balance: {}",
                            e
                        );
                    }
                }
                balance.remaining_minutes
            }
            Err(e) => {
                tracing::warn!(
                    "[SessionCountdownController] balance fetch failed, using fallback: {}",
                    e
                );
                match self.state.get_cached_balance().await {
                    Some(cached) => cached,
                    None => {
                        let fallback = tier.default_minutes();
                        if let Err(e) = self.state.set_cached_balance(fallback).await {
                            tracing::warn!(
                                "[SessionCountdownController] failed to cache fallback balance: {}",
                                e
                            );
                        }
                        fallback
                    }
                }
            }
        }
    }

    // ========================================================================
    // Timer
    // ========================================================================

    fn spawn_timer(&self, binding: String, cancel: CancellationToken) {
        let controller = self.clone();
        tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            // A stalled loop skips missed ticks rather than bursting.
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if !controller.handle_tick(&binding).await {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// One countdown tick. Returns `false` when the timer should stop:
    /// the session is gone, the binding is stale, or the countdown expired.
    async fn handle_tick(&self, binding: &str) -> bool {
        let (tick, effective_id, server_acknowledged) = {
            let mut inner = self.inner.lock().await;
            let Phase::Active(active) = &mut inner.phase else {
                return false;
            };
            // Stale timer from a torn-down session: no mutation, no
            // notification.
            if active.binding != binding {
                return false;
            }
            let tick = active.countdown.tick();
            (tick, active.session.id.clone(), active.server_acknowledged)
        };

        self.sink.timer_update(tick.update);

        // Gateway work runs detached so the timer keeps firing on schedule
        // regardless of an in-flight call.
        match tick.sync {
            SyncDecision::NotDue => {}
            SyncDecision::Skip | SyncDecision::Due { .. } if !server_acknowledged => {
                self.spawn_create_retry(binding.to_string());
            }
            SyncDecision::Skip => {}
            SyncDecision::Due { minutes_used } => {
                self.spawn_sync(binding.to_string(), effective_id.clone(), minutes_used);
            }
        }

        if tick.expired {
            tracing::info!(
                "[SessionCountdownController] countdown exhausted for session {}",
                effective_id
            );
            let _ = self.end_session(EndReason::Expired).await;
            return false;
        }
        true
    }

    // ========================================================================
    // Server sync
    // ========================================================================

    fn spawn_sync(&self, binding: String, session_id: String, minutes_used: u64) {
        let controller = self.clone();
        tokio::spawn(async move {
            controller.run_sync(&binding, session_id, minutes_used).await;
        });
    }

    /// Reports elapsed minutes and truths-up the cached balance. Failure
    /// leaves the local countdown undisturbed; the next interval retries.
    async fn run_sync(&self, binding: &str, session_id: String, minutes_used: u64) {
        let request = RealtimeSyncRequest {
            session_id,
            minutes_used,
        };
        match self.gateway.sync_realtime(request).await {
            Ok(balance) => {
                if let Err(e) = self.state.set_cached_balance(balance.remaining_minutes).await {
                    tracing::warn!(
                        "[SessionCountdownController] failed to persist synced balance: {}",
                        e
                    );
                }
                if balance.remaining_minutes <= 0.0 {
                    tracing::info!(
                        "[SessionCountdownController] server reports no remaining balance, expiring session"
                    );
                    self.end_session_if_current(binding, EndReason::Expired).await;
                }
            }
            Err(e) => {
                tracing::warn!(
                    "[SessionCountdownController] realtime sync failed, retrying next interval: {}",
                    e
                );
            }
        }
    }

    fn spawn_create_retry(&self, binding: String) {
        let controller = self.clone();
        tokio::spawn(async move {
            controller.run_create_retry(&binding).await;
        });
    }

    /// Retries session creation for a session running offline. On success
    /// the server-issued identifier is adopted and billing sync begins on
    /// the next interval.
    async fn run_create_retry(&self, binding: &str) {
        let params = {
            let inner = self.inner.lock().await;
            match &inner.phase {
                Phase::Active(active) if active.binding == binding => active.session.params.clone(),
                _ => return,
            }
        };

        match self
            .gateway
            .create_session(CreateSessionRequest {
                company: params.company,
                position: params.position,
                session_type: params.session_type,
            })
            .await
        {
            Ok(created) => {
                let mut inner = self.inner.lock().await;
                if let Phase::Active(active) = &mut inner.phase {
                    if active.binding == binding {
                        tracing::info!(
                            "[SessionCountdownController] offline session acknowledged as {}",
                            created.session_id
                        );
                        active.session.id = created.session_id;
                        active.server_acknowledged = true;
                    }
                }
            }
            Err(e) => {
                tracing::debug!(
                    "[SessionCountdownController] session creation retry failed, still offline: {}",
                    e
                );
            }
        }
    }

    /// Terminates only if `binding` still identifies the running session.
    /// Guards a late sync response from ending the torn-down session's
    /// successor.
    async fn end_session_if_current(&self, binding: &str, reason: EndReason) {
        let is_current = {
            let inner = self.inner.lock().await;
            matches!(&inner.phase, Phase::Active(active) if active.binding == binding)
        };
        if is_current {
            let _ = self.end_session(reason).await;
        }
    }
}

//! Integration tests for the session countdown controller.
//!
//! All timing runs on tokio's paused test clock: sleeping auto-advances
//! virtual time and fires the controller's 1-second timer deterministically.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use tally_application::{AuthService, SessionCountdownController};
use tally_core::balance::{SubscriptionTier, UserBalance};
use tally_core::error::{Result, TallyError};
use tally_core::gateway::{
    CreateSessionRequest, CreatedSession, FinalizeSessionRequest, RealtimeSyncRequest,
    SaveTranscriptRequest, SessionGateway, SyncedBalance,
};
use tally_core::session::{
    EndReason, NotificationSink, SessionParams, SessionStatus, TimerUpdate,
};
use tally_core::state::{PersistedState, StateRepository};

// ----------------------------------------------------------------------
// Mocks
// ----------------------------------------------------------------------

struct MockGateway {
    balance: Result<UserBalance>,
    created: Result<CreatedSession>,
    synced: Result<SyncedBalance>,
    finalize: Result<()>,
    sync_calls: Mutex<Vec<RealtimeSyncRequest>>,
    finalize_calls: Mutex<Vec<FinalizeSessionRequest>>,
    create_calls: AtomicUsize,
}

impl MockGateway {
    fn online(remaining_minutes: f64) -> Self {
        Self {
            balance: Ok(UserBalance {
                remaining_minutes,
                subscription_tier: SubscriptionTier::Free,
                free_minutes_reset_at: None,
            }),
            created: Ok(CreatedSession {
                session_id: "srv-session".to_string(),
            }),
            synced: Ok(SyncedBalance { remaining_minutes }),
            finalize: Ok(()),
            sync_calls: Mutex::new(Vec::new()),
            finalize_calls: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
        }
    }

    fn sync_count(&self) -> usize {
        self.sync_calls.lock().unwrap().len()
    }

    fn finalize_count(&self) -> usize {
        self.finalize_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionGateway for MockGateway {
    async fn fetch_user_balance(&self) -> Result<UserBalance> {
        self.balance.clone()
    }
    async fn create_session(&self, _request: CreateSessionRequest) -> Result<CreatedSession> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.created.clone()
    }
    async fn sync_realtime(&self, request: RealtimeSyncRequest) -> Result<SyncedBalance> {
        self.sync_calls.lock().unwrap().push(request);
        self.synced.clone()
    }
    async fn finalize_session(&self, request: FinalizeSessionRequest) -> Result<()> {
        self.finalize_calls.lock().unwrap().push(request);
        self.finalize.clone()
    }
    async fn save_transcript(&self, _request: SaveTranscriptRequest) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStateRepository {
    state: Mutex<PersistedState>,
}

#[async_trait]
impl StateRepository for MemoryStateRepository {
    async fn get_state(&self) -> Result<PersistedState> {
        Ok(self.state.lock().unwrap().clone())
    }
    async fn get_cached_balance(&self) -> Option<f64> {
        self.state.lock().unwrap().cached_balance_minutes
    }
    async fn set_cached_balance(&self, minutes: f64) -> Result<()> {
        self.state.lock().unwrap().cached_balance_minutes = Some(minutes);
        Ok(())
    }
    async fn clear_cached_balance(&self) -> Result<()> {
        self.state.lock().unwrap().cached_balance_minutes = None;
        Ok(())
    }
    async fn get_auth_token(&self) -> Option<String> {
        self.state.lock().unwrap().auth_token.clone()
    }
    async fn set_auth_token(&self, token: String) -> Result<()> {
        self.state.lock().unwrap().auth_token = Some(token);
        Ok(())
    }
    async fn clear_auth_token(&self) -> Result<()> {
        self.state.lock().unwrap().auth_token = None;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    updates: Mutex<Vec<TimerUpdate>>,
}

impl RecordingSink {
    fn updates(&self) -> Vec<TimerUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn timer_update(&self, update: TimerUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

struct Fixture {
    controller: SessionCountdownController,
    gateway: Arc<MockGateway>,
    state: Arc<MemoryStateRepository>,
    sink: Arc<RecordingSink>,
}

fn fixture(gateway: MockGateway) -> Fixture {
    let gateway = Arc::new(gateway);
    let state = Arc::new(MemoryStateRepository::default());
    let sink = Arc::new(RecordingSink::default());
    let controller =
        SessionCountdownController::new(gateway.clone(), state.clone(), sink.clone());
    Fixture {
        controller,
        gateway,
        state,
        sink,
    }
}

fn jwt_with_plan(plan: &str) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"user-1","plan":"{}"}}"#, plan)),
        URL_SAFE_NO_PAD.encode("signature")
    )
}

/// Advances the paused clock past the given second boundary. The extra half
/// second keeps assertions off the exact tick deadlines, so every tick (and
/// the detached work it spawned) has completed by the time this returns.
async fn pass_time(seconds: u64) {
    tokio::time::sleep(Duration::from_millis(seconds * 1000 + 500)).await;
}

// ----------------------------------------------------------------------
// Countdown behavior
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn remaining_seconds_is_non_increasing_and_never_negative() {
    let f = fixture(MockGateway::online(1.0));

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(95).await;

    let updates = f.sink.updates();
    assert!(!updates.is_empty());
    let mut previous = u64::MAX;
    for update in &updates {
        assert!(update.remaining_seconds <= previous);
        previous = update.remaining_seconds;
    }
    assert_eq!(updates.last().unwrap().remaining_seconds, 0);
}

#[tokio::test(start_paused = true)]
async fn five_minute_session_expires_after_300_ticks_exactly_once() {
    let f = fixture(MockGateway::online(5.0));

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(305).await;

    assert!(f.controller.active_session().await.is_none());

    let finalized = f.gateway.finalize_calls.lock().unwrap();
    assert_eq!(finalized.len(), 1, "session must be billed exactly once");
    assert_eq!(finalized[0].status, SessionStatus::Expired);
    drop(finalized);

    let updates = f.sink.updates();
    assert_eq!(updates.last().unwrap().remaining_seconds, 0);
    assert_eq!(updates.last().unwrap().display, "00:00");
    // One update per second until expiry, none afterwards.
    assert_eq!(updates.len(), 300);
}

#[tokio::test(start_paused = true)]
async fn timer_updates_carry_formatted_display() {
    let f = fixture(MockGateway::online(5.0));

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(1).await;

    let updates = f.sink.updates();
    assert_eq!(updates[0].remaining_seconds, 299);
    assert_eq!(updates[0].display, "04:59");
    assert_eq!(updates[0].elapsed_minutes, 0);
    assert_eq!(updates[0].remaining_minutes, 4);
}

// ----------------------------------------------------------------------
// Start semantics
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn start_session_is_idempotent_while_active() {
    let f = fixture(MockGateway::online(5.0));

    let first = f
        .controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    let second = f
        .controller
        .start_session(SessionParams::default())
        .await
        .unwrap();

    assert_eq!(first.session_id, second.session_id);
    assert_eq!(f.gateway.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn start_adopts_server_issued_session_id() {
    let f = fixture(MockGateway::online(5.0));

    let handle = f
        .controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    assert_eq!(handle.session_id, "srv-session");
}

#[tokio::test(start_paused = true)]
async fn balance_fetch_failure_falls_back_to_free_tier_default() {
    let f = fixture(MockGateway {
        balance: Err(TallyError::network("dns failure")),
        ..MockGateway::online(5.0)
    });

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(1).await;

    // 10 minutes -> 600 seconds, minus the first tick.
    assert_eq!(f.sink.updates()[0].remaining_seconds, 599);
    // The fallback default is installed into the empty cache.
    assert_eq!(f.state.get_cached_balance().await, Some(10.0));
}

#[tokio::test(start_paused = true)]
async fn balance_fetch_failure_falls_back_to_paid_tier_default() {
    let f = fixture(MockGateway {
        balance: Err(TallyError::network("dns failure")),
        ..MockGateway::online(5.0)
    });
    f.state
        .set_auth_token(jwt_with_plan("paid"))
        .await
        .unwrap();
    f.state.clear_cached_balance().await.unwrap();

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    // Zero budget: the countdown expires on the first tick.
    pass_time(2).await;

    assert!(f.controller.active_session().await.is_none());
    let finalized = f.gateway.finalize_calls.lock().unwrap();
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].status, SessionStatus::Expired);
    // Remote validation requires a non-zero charge.
    assert_eq!(finalized[0].minutes_used, 1);
}

#[tokio::test(start_paused = true)]
async fn balance_fetch_failure_prefers_cached_balance_over_default() {
    let f = fixture(MockGateway {
        balance: Err(TallyError::network("dns failure")),
        ..MockGateway::online(5.0)
    });
    f.state.set_cached_balance(3.0).await.unwrap();

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(1).await;

    // 3 cached minutes -> 180 seconds, minus the first tick.
    assert_eq!(f.sink.updates()[0].remaining_seconds, 179);
}

#[tokio::test(start_paused = true)]
async fn paid_tier_start_caches_the_fetched_balance() {
    let f = fixture(MockGateway::online(25.0));
    f.state
        .set_auth_token(jwt_with_plan("paid"))
        .await
        .unwrap();

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();

    assert_eq!(f.state.get_cached_balance().await, Some(25.0));
}

#[tokio::test(start_paused = true)]
async fn free_tier_start_does_not_cache_the_fetched_balance() {
    let f = fixture(MockGateway::online(25.0));

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();

    assert_eq!(f.state.get_cached_balance().await, None);
}

// ----------------------------------------------------------------------
// Server sync
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn sync_is_skipped_before_a_whole_minute_has_elapsed() {
    let f = fixture(MockGateway::online(5.0));

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(59).await;

    assert_eq!(f.gateway.sync_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn sync_reports_elapsed_whole_minutes_every_thirty_seconds() {
    let f = fixture(MockGateway::online(5.0));

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(125).await;

    let calls = f.gateway.sync_calls.lock().unwrap();
    let minutes: Vec<u64> = calls.iter().map(|c| c.minutes_used).collect();
    assert_eq!(minutes, vec![1, 1, 2]);
    assert!(calls.iter().all(|c| c.session_id == "srv-session"));
}

#[tokio::test(start_paused = true)]
async fn successful_sync_overwrites_the_cached_balance() {
    let f = fixture(MockGateway {
        synced: Ok(SyncedBalance {
            remaining_minutes: 4.0,
        }),
        ..MockGateway::online(5.0)
    });

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(65).await;

    assert_eq!(f.state.get_cached_balance().await, Some(4.0));
}

#[tokio::test(start_paused = true)]
async fn sync_reporting_zero_balance_expires_the_session_early() {
    let f = fixture(MockGateway {
        synced: Ok(SyncedBalance {
            remaining_minutes: 0.0,
        }),
        ..MockGateway::online(5.0)
    });

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    // First sync fires at 60s, well before the 300s local countdown.
    pass_time(65).await;

    assert!(f.controller.active_session().await.is_none());
    let finalized = f.gateway.finalize_calls.lock().unwrap();
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].status, SessionStatus::Expired);
}

#[tokio::test(start_paused = true)]
async fn sync_failure_never_disturbs_the_local_countdown() {
    let f = fixture(MockGateway {
        synced: Err(TallyError::network("connection reset")),
        ..MockGateway::online(5.0)
    });
    f.state.set_cached_balance(5.0).await.unwrap();

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(95).await;

    // Still active, still counting, cache untouched by the failed syncs.
    assert!(f.controller.active_session().await.is_some());
    assert_eq!(f.sink.updates().last().unwrap().remaining_seconds, 300 - 95);
    assert_eq!(f.state.get_cached_balance().await, Some(5.0));
    // Retried on each interval rather than giving up.
    assert!(f.gateway.sync_count() >= 2);
}

// ----------------------------------------------------------------------
// Offline degradation
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn create_failure_degrades_to_offline_with_local_id() {
    let f = fixture(MockGateway {
        created: Err(TallyError::network("offline")),
        ..MockGateway::online(5.0)
    });

    let handle = f
        .controller
        .start_session(SessionParams::default())
        .await
        .unwrap();

    // Local placeholder, not the server id.
    assert_ne!(handle.session_id, "srv-session");
    pass_time(95).await;

    // Countdown runs; billing sync is skipped while unacknowledged; the
    // sync slots retry creation instead.
    assert!(f.controller.active_session().await.is_some());
    assert_eq!(f.gateway.sync_count(), 0);
    assert!(f.gateway.create_calls.load(Ordering::SeqCst) >= 3);
}

// ----------------------------------------------------------------------
// Termination
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn end_session_is_idempotent() {
    let f = fixture(MockGateway::online(5.0));

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(10).await;

    f.controller.end_session(EndReason::Completed).await.unwrap();
    f.controller.end_session(EndReason::Completed).await.unwrap();

    assert_eq!(f.gateway.finalize_count(), 1);
    assert!(f.controller.active_session().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn end_session_bills_at_least_one_minute() {
    let f = fixture(MockGateway::online(5.0));

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(5).await;

    f.controller.end_session(EndReason::Completed).await.unwrap();

    let finalized = f.gateway.finalize_calls.lock().unwrap();
    assert_eq!(finalized[0].minutes_used, 1);
    assert_eq!(finalized[0].status, SessionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn permission_failure_at_finalize_still_reaches_idle() {
    let f = fixture(MockGateway {
        finalize: Err(TallyError::permission("insufficient balance")),
        ..MockGateway::online(5.0)
    });

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(10).await;

    f.controller.end_session(EndReason::Completed).await.unwrap();

    assert!(f.controller.active_session().await.is_none());
    assert_eq!(f.gateway.finalize_count(), 1, "no retry loop on permission failure");

    // The controller is reusable afterwards.
    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    assert!(f.controller.active_session().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn no_ticks_are_delivered_after_teardown() {
    let f = fixture(MockGateway::online(5.0));

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(10).await;
    f.controller.end_session(EndReason::Completed).await.unwrap();

    let count_at_teardown = f.sink.updates().len();
    pass_time(30).await;
    assert_eq!(f.sink.updates().len(), count_at_teardown);
}

#[tokio::test(start_paused = true)]
async fn cancel_all_clears_timer_session_and_cached_balance() {
    let f = fixture(MockGateway::online(5.0));
    f.state.set_cached_balance(5.0).await.unwrap();

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(10).await;

    f.controller.cancel_all().await;

    assert!(f.controller.active_session().await.is_none());
    assert_eq!(f.state.get_cached_balance().await, None);
    // No finalize: cancel_all discards rather than bills.
    assert_eq!(f.gateway.finalize_count(), 0);

    let count_at_cancel = f.sink.updates().len();
    pass_time(30).await;
    assert_eq!(f.sink.updates().len(), count_at_cancel);
}

// ----------------------------------------------------------------------
// Transcript
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn save_transcript_requires_an_active_session() {
    let f = fixture(MockGateway::online(5.0));

    let err = f.controller.save_transcript("hello").await.unwrap_err();
    assert!(err.is_not_found());

    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    f.controller.save_transcript("hello").await.unwrap();
}

// ----------------------------------------------------------------------
// Token custody
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn login_cancels_countdown_and_clears_previous_cache() {
    let f = fixture(MockGateway::online(5.0));
    let auth = AuthService::new(f.state.clone(), f.controller.clone());

    f.state.set_cached_balance(9.0).await.unwrap();
    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(10).await;

    auth.login(jwt_with_plan("paid")).await.unwrap();

    assert!(f.controller.active_session().await.is_none());
    assert_eq!(f.state.get_cached_balance().await, None);
    assert_eq!(auth.subscription_tier().await, SubscriptionTier::Paid);
}

#[tokio::test(start_paused = true)]
async fn logout_clears_token_countdown_and_cache() {
    let f = fixture(MockGateway::online(5.0));
    let auth = AuthService::new(f.state.clone(), f.controller.clone());

    auth.login(jwt_with_plan("free")).await.unwrap();
    f.controller
        .start_session(SessionParams::default())
        .await
        .unwrap();
    pass_time(10).await;

    auth.logout().await.unwrap();

    assert!(f.controller.active_session().await.is_none());
    assert_eq!(f.state.get_auth_token().await, None);
    assert_eq!(f.state.get_cached_balance().await, None);
    assert!(!auth.has_valid_token(chrono::Utc::now()).await);
}

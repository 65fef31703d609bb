//! Verification Session Integration Tests
//!
//! Full flows through the controller:
//! - Code issuance and event recording at bootstrap
//! - Verdicts for matching, mismatched and bot submissions
//! - Cookie persistence and restore
//! - Loading flag and fault handling

use async_trait::async_trait;
use human_gate::analyzer::PatternAnalyzer;
use human_gate::clock::{Clock, ManualClock, Timer};
use human_gate::engine::{EngineConfig, StaticAgent, VerificationEngine};
use human_gate::events::{EventHistory, EventRecorder};
use human_gate::input::{InputChannel, InputSurface, RawInput};
use human_gate::otp::OtpService;
use human_gate::session::{
    SessionConfig, SessionStatus, VerificationSessionController, FAILURE_MESSAGE, FAULT_MESSAGE,
    VERIFIED_COOKIE,
};
use human_gate::storage::{
    CookieStore, FileStore, KeyValueStore, MemoryStore, StorageError, StorageResult,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

const BROWSER: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 Safari/605.1.15";
const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    surface: Arc<InputSurface>,
    controller: Arc<VerificationSessionController>,
}

fn build_controller(
    clock: Arc<ManualClock>,
    codes: Arc<dyn KeyValueStore>,
    cookies: Arc<dyn CookieStore>,
    surface: Arc<InputSurface>,
    timer: Arc<dyn Timer>,
    agent: &str,
) -> VerificationSessionController {
    let history = Arc::new(EventHistory::new());
    let recorder = EventRecorder::new(Arc::clone(&surface), Arc::clone(&history), clock);
    let otp = Arc::new(OtpService::new(codes));
    let engine = VerificationEngine::new(
        Arc::clone(&otp),
        history,
        Arc::new(StaticAgent(agent.to_string())),
        timer,
        PatternAnalyzer::new(),
        &EngineConfig::default(),
    )
    .unwrap();
    VerificationSessionController::new(otp, engine, recorder, cookies, SessionConfig::default())
}

fn harness(agent: &str) -> Harness {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let surface = Arc::new(InputSurface::new());
    let controller = build_controller(
        clock.clone(),
        store.clone(),
        store.clone(),
        Arc::clone(&surface),
        clock.clone(),
        agent,
    );
    Harness {
        clock,
        store,
        surface,
        controller: Arc::new(controller),
    }
}

/// Local storage whose reads can be made to fail
struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("local storage disabled".to_string()));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key)
    }
}

/// Timer that blocks until released
struct GatedTimer {
    release: Notify,
}

#[async_trait]
impl Timer for GatedTimer {
    async fn sleep(&self, _duration: Duration) {
        self.release.notified().await;
    }
}

#[tokio::test]
async fn test_correct_code_verifies_and_sets_cookie() {
    let h = harness(BROWSER);
    assert_eq!(h.controller.bootstrap().unwrap(), SessionStatus::Unverified);
    h.controller.initiate();
    assert!(h.controller.context().show_verification);

    let code = h.controller.active_code().unwrap().expect("code issued at bootstrap");
    let context = h.controller.submit(&code).await;

    assert!(context.is_verified);
    assert!(!context.is_loading);
    assert!(!context.show_verification);
    assert_eq!(context.status, SessionStatus::Verified);
    assert_eq!(context.error, None);
    assert_eq!(context.success, Some(true));
    assert_eq!(
        h.store.get_cookie(VERIFIED_COOKIE).unwrap().as_deref(),
        Some("true")
    );
}

#[tokio::test]
async fn test_cookie_restores_without_new_code() {
    let h = harness(BROWSER);
    h.store
        .set_cookie(VERIFIED_COOKIE, "true", Duration::from_secs(86_400))
        .unwrap();

    assert_eq!(h.controller.bootstrap().unwrap(), SessionStatus::Verified);
    assert!(h.controller.context().is_verified);
    assert_eq!(h.controller.active_code().unwrap(), None);
    assert!(!h.controller.is_recording());

    // Nothing to show once verified
    h.controller.initiate();
    assert!(!h.controller.context().show_verification);
}

#[tokio::test]
async fn test_expired_cookie_does_not_restore() {
    let h = harness(BROWSER);
    h.store
        .set_cookie(VERIFIED_COOKIE, "true", Duration::from_secs(86_400))
        .unwrap();
    h.clock.advance(Duration::from_secs(86_401));

    assert_eq!(h.controller.bootstrap().unwrap(), SessionStatus::Unverified);
    assert!(h.controller.active_code().unwrap().is_some());
}

#[tokio::test]
async fn test_bootstrap_runs_once() {
    let h = harness(BROWSER);
    h.controller.bootstrap().unwrap();
    let first = h.controller.active_code().unwrap();

    h.controller.bootstrap().unwrap();
    assert_eq!(h.controller.active_code().unwrap(), first);
    assert_eq!(h.surface.listener_count(InputChannel::PointerMove), 1);
}

#[tokio::test]
async fn test_wrong_code_fails_then_retry_succeeds() {
    let h = harness(BROWSER);
    h.controller.bootstrap().unwrap();
    let code = h.controller.active_code().unwrap().unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let context = h.controller.submit(wrong).await;
    assert_eq!(context.status, SessionStatus::Failed);
    assert!(!context.is_verified);
    assert_eq!(context.error.as_deref(), Some(FAILURE_MESSAGE));
    assert_eq!(context.success, Some(false));
    assert_eq!(h.store.get_cookie(VERIFIED_COOKIE).unwrap(), None);

    let context = h.controller.submit(&code).await;
    assert_eq!(context.status, SessionStatus::Verified);
    assert_eq!(context.error, None);
    assert_eq!(context.success, Some(true));
}

#[tokio::test]
async fn test_bot_agent_is_rejected_with_correct_code() {
    let h = harness(GOOGLEBOT);
    h.controller.bootstrap().unwrap();
    let code = h.controller.active_code().unwrap().unwrap();

    let context = h.controller.submit(&code).await;
    assert_eq!(context.status, SessionStatus::Failed);
    assert_eq!(context.error.as_deref(), Some(FAILURE_MESSAGE));
    assert_eq!(h.store.get_cookie(VERIFIED_COOKIE).unwrap(), None);
}

#[tokio::test]
async fn test_storage_fault_surfaces_generic_error() {
    let clock = Arc::new(ManualClock::new(0));
    let codes = Arc::new(FlakyStore {
        inner: MemoryStore::new(clock.clone()),
        fail_reads: AtomicBool::new(false),
    });
    let cookies = Arc::new(MemoryStore::new(clock.clone()));
    let controller = build_controller(
        clock.clone(),
        codes.clone(),
        cookies.clone(),
        Arc::new(InputSurface::new()),
        clock.clone(),
        BROWSER,
    );

    controller.bootstrap().unwrap();
    let code = controller.active_code().unwrap().unwrap();
    codes.fail_reads.store(true, Ordering::SeqCst);

    let context = controller.submit(&code).await;
    assert_eq!(context.status, SessionStatus::Failed);
    assert_eq!(context.error.as_deref(), Some(FAULT_MESSAGE));
    assert_eq!(context.success, None);
    assert!(!context.is_loading);
    assert_eq!(cookies.get_cookie(VERIFIED_COOKIE).unwrap(), None);
}

#[tokio::test]
async fn test_loading_flag_spans_verification() {
    let clock = Arc::new(ManualClock::new(0));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let timer = Arc::new(GatedTimer {
        release: Notify::new(),
    });
    let controller = Arc::new(build_controller(
        clock.clone(),
        store.clone(),
        store.clone(),
        Arc::new(InputSurface::new()),
        timer.clone(),
        BROWSER,
    ));
    controller.bootstrap().unwrap();
    let code = controller.active_code().unwrap().unwrap();
    assert!(!controller.context().is_loading);

    let task = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.submit(&code).await })
    };

    for _ in 0..100 {
        if controller.context().is_loading {
            break;
        }
        tokio::task::yield_now().await;
    }
    let during = controller.context();
    assert!(during.is_loading);
    assert_eq!(during.status, SessionStatus::Pending);

    timer.release.notify_one();
    let after = task.await.unwrap();
    assert!(!after.is_loading);
    assert!(after.is_verified);
}

#[tokio::test]
async fn test_loading_flag_spans_rejected_verification() {
    let clock = Arc::new(ManualClock::new(0));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let timer = Arc::new(GatedTimer {
        release: Notify::new(),
    });
    let controller = Arc::new(build_controller(
        clock.clone(),
        store.clone(),
        store.clone(),
        Arc::new(InputSurface::new()),
        timer.clone(),
        BROWSER,
    ));
    controller.bootstrap().unwrap();
    let code = controller.active_code().unwrap().unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let task = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.submit(wrong).await })
    };

    for _ in 0..100 {
        if controller.context().is_loading {
            break;
        }
        tokio::task::yield_now().await;
    }
    let during = controller.context();
    assert!(during.is_loading);
    assert_eq!(during.status, SessionStatus::Pending);
    assert_eq!(during.error, None);

    timer.release.notify_one();
    let after = task.await.unwrap();
    assert!(!after.is_loading);
    assert_eq!(after.status, SessionStatus::Failed);
    assert_eq!(after.error.as_deref(), Some(FAILURE_MESSAGE));
    assert!(!controller.context().is_loading);
}

#[tokio::test]
async fn test_recording_feeds_history_until_shutdown() {
    let h = harness(BROWSER);
    h.controller.bootstrap().unwrap();
    assert!(h.controller.is_recording());

    for i in 0..5 {
        h.surface.dispatch(&RawInput::PointerMove {
            x: i as f64 * 10.0,
            y: 5.0,
        });
        h.clock.advance(Duration::from_millis(16));
    }
    h.surface.dispatch(&RawInput::KeyPress { key: "4".to_string() });
    assert_eq!(h.controller.history().len(), 6);
    assert!(h.controller.history().snapshot()[5].is_key());

    h.controller.shutdown();
    assert!(!h.controller.is_recording());
    h.surface.dispatch(&RawInput::PointerMove { x: 0.0, y: 0.0 });
    assert_eq!(h.controller.history().len(), 6);
}

#[tokio::test]
async fn test_verification_waits_simulated_latency() {
    let h = harness(BROWSER);
    h.controller.bootstrap().unwrap();
    let code = h.controller.active_code().unwrap().unwrap();
    let start = h.clock.now_millis();

    h.controller.submit(&code).await;
    assert_eq!(h.clock.now_millis() - start, 1500);
}

#[tokio::test]
async fn test_file_store_persists_verification_across_sessions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));

    {
        let store = Arc::new(FileStore::open(&path, clock.clone()).unwrap());
        let controller = build_controller(
            clock.clone(),
            store.clone(),
            store.clone(),
            Arc::new(InputSurface::new()),
            clock.clone(),
            BROWSER,
        );
        controller.bootstrap().unwrap();
        let code = controller.active_code().unwrap().unwrap();
        assert!(controller.submit(&code).await.is_verified);
        controller.shutdown();
    }

    let store = Arc::new(FileStore::open(&path, clock.clone()).unwrap());
    let controller = build_controller(
        clock.clone(),
        store.clone(),
        store.clone(),
        Arc::new(InputSurface::new()),
        clock.clone(),
        BROWSER,
    );
    assert_eq!(controller.bootstrap().unwrap(), SessionStatus::Verified);
}

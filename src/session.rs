// Verification session controller
//
// Process-wide state machine behind the UI context:
//
//   Unverified --submit--> Pending --pass--> Verified
//                             |
//                             +--reject/fault--> Failed --submit--> Pending
//
// Verified is absorbing and is persisted with a short-lived cookie, so a
// reload restores it without issuing a code or running the engine.

use crate::engine::{VerificationEngine, VerificationError};
use crate::events::{EventHistory, EventRecorder, RecordingHandle};
use crate::lock_utils::lock_or_recover;
use crate::otp::OtpService;
use crate::storage::{CookieStore, StorageResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Cookie marking a verified agent
pub const VERIFIED_COOKIE: &str = "human-verified";

pub const VERIFIED_COOKIE_VALUE: &str = "true";

/// Cookie lifetime (24 hours)
pub const VERIFIED_COOKIE_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Shown when the engine rejects a submission
pub const FAILURE_MESSAGE: &str = "Verification failed. Please try again.";

/// Shown when verification could not complete
pub const FAULT_MESSAGE: &str = "An error occurred during verification. Please try again.";

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name of the persistence cookie
    pub cookie_name: String,
    /// Persistence cookie max-age in seconds
    pub cookie_max_age_secs: u64,
    /// Delay before the route gate redirects unverified agents, in milliseconds
    pub redirect_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: VERIFIED_COOKIE.to_string(),
            cookie_max_age_secs: VERIFIED_COOKIE_MAX_AGE.as_secs(),
            redirect_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Unverified,
    Pending,
    Verified,
    Failed,
}

/// Inputs to the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A valid persistence cookie was found at startup
    Restored,
    /// A code was submitted
    Submitted,
    /// The engine accepted the submission
    Passed,
    /// The engine rejected the submission
    Rejected,
    /// Verification could not complete
    Faulted,
}

impl SessionStatus {
    /// Transition function
    pub fn apply(self, event: SessionEvent) -> SessionStatus {
        use SessionEvent::*;
        use SessionStatus::*;

        match (self, event) {
            (Verified, _) => Verified,
            (_, Restored) => Verified,
            (_, Submitted) => Pending,
            (Pending, Passed) => Verified,
            (Pending, Rejected) | (Pending, Faulted) => Failed,
            (state, _) => state,
        }
    }

    pub fn is_verified(self) -> bool {
        self == SessionStatus::Verified
    }
}

/// Session outcome fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSession {
    pub status: SessionStatus,
    pub last_error: Option<String>,
    pub last_success: Option<bool>,
}

impl Default for VerificationSession {
    fn default() -> Self {
        Self {
            status: SessionStatus::Unverified,
            last_error: None,
            last_success: None,
        }
    }
}

/// State surface consumed by the rendering layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationContext {
    pub is_verified: bool,
    pub is_loading: bool,
    pub show_verification: bool,
    pub error: Option<String>,
    pub success: Option<bool>,
    pub status: SessionStatus,
}

struct ControllerState {
    session: VerificationSession,
    is_loading: bool,
    show_verification: bool,
    bootstrapped: bool,
    recording: Option<RecordingHandle>,
}

impl ControllerState {
    fn context(&self) -> VerificationContext {
        VerificationContext {
            is_verified: self.session.status.is_verified(),
            is_loading: self.is_loading,
            show_verification: self.show_verification,
            error: self.session.last_error.clone(),
            success: self.session.last_success,
            status: self.session.status,
        }
    }
}

/// Coordinates code issuance, event recording and verification for one agent
pub struct VerificationSessionController {
    state: Mutex<ControllerState>,
    otp: Arc<OtpService>,
    engine: VerificationEngine,
    recorder: EventRecorder,
    cookies: Arc<dyn CookieStore>,
    config: SessionConfig,
}

impl VerificationSessionController {
    pub fn new(
        otp: Arc<OtpService>,
        engine: VerificationEngine,
        recorder: EventRecorder,
        cookies: Arc<dyn CookieStore>,
        config: SessionConfig,
    ) -> Self {
        Self {
            state: Mutex::new(ControllerState {
                session: VerificationSession::default(),
                is_loading: false,
                show_verification: false,
                bootstrapped: false,
                recording: None,
            }),
            otp,
            engine,
            recorder,
            cookies,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<EventHistory> {
        self.recorder.history()
    }

    /// First-load setup. Runs once per controller; later calls return the
    /// current status.
    ///
    /// With a valid persistence cookie the session is restored as Verified.
    /// Otherwise a fresh code is issued and event recording starts.
    pub fn bootstrap(&self) -> StorageResult<SessionStatus> {
        let mut state = lock_or_recover(&self.state, "verification session");
        if state.bootstrapped {
            return Ok(state.session.status);
        }

        let cookie = self.cookies.get_cookie(&self.config.cookie_name)?;
        if cookie.as_deref() == Some(VERIFIED_COOKIE_VALUE) {
            state.session.status = state.session.status.apply(SessionEvent::Restored);
            info!("Verification restored from cookie '{}'", self.config.cookie_name);
        } else {
            self.otp.issue()?;
            state.recording = Some(self.recorder.start());
            info!("Verification session started; awaiting code entry");
        }

        state.bootstrapped = true;
        Ok(state.session.status)
    }

    /// Ask the rendering layer to show the verification form
    pub fn initiate(&self) {
        let mut state = lock_or_recover(&self.state, "verification session");
        if !state.session.status.is_verified() {
            state.show_verification = true;
            debug!("Verification form requested");
        }
    }

    /// Verify a submitted code and record the outcome.
    ///
    /// `is_loading` is true from the first poll until the outcome is recorded.
    pub async fn submit(&self, code: &str) -> VerificationContext {
        {
            let mut state = lock_or_recover(&self.state, "verification session");
            state.is_loading = true;
            state.session.last_error = None;
            state.session.status = state.session.status.apply(SessionEvent::Submitted);
        }

        let outcome: Result<bool, VerificationError> = match self.engine.verify(code).await {
            Ok(verdict) if verdict.is_human => self.persist_verified().map(|_| true).map_err(Into::into),
            Ok(_) => Ok(false),
            Err(e) => Err(e),
        };

        let mut state = lock_or_recover(&self.state, "verification session");
        match outcome {
            Ok(true) => {
                state.session.status = state.session.status.apply(SessionEvent::Passed);
                state.session.last_error = None;
                state.session.last_success = Some(true);
                state.show_verification = false;
                info!("Human verification passed");
            }
            Ok(false) => {
                state.session.status = state.session.status.apply(SessionEvent::Rejected);
                state.session.last_error = Some(FAILURE_MESSAGE.to_string());
                state.session.last_success = Some(false);
                warn!("Human verification rejected");
            }
            Err(e) => {
                error!("Verification error: {}", e);
                state.session.status = state.session.status.apply(SessionEvent::Faulted);
                state.session.last_error = Some(FAULT_MESSAGE.to_string());
            }
        }
        state.is_loading = false;
        state.context()
    }

    /// Currently active code, for display
    pub fn active_code(&self) -> StorageResult<Option<String>> {
        self.otp.retrieve()
    }

    pub fn context(&self) -> VerificationContext {
        lock_or_recover(&self.state, "verification session").context()
    }

    pub fn session(&self) -> VerificationSession {
        lock_or_recover(&self.state, "verification session")
            .session
            .clone()
    }

    pub fn status(&self) -> SessionStatus {
        lock_or_recover(&self.state, "verification session")
            .session
            .status
    }

    pub fn is_recording(&self) -> bool {
        lock_or_recover(&self.state, "verification session")
            .recording
            .as_ref()
            .is_some_and(RecordingHandle::is_active)
    }

    /// Stop event recording (teardown)
    pub fn shutdown(&self) {
        let mut state = lock_or_recover(&self.state, "verification session");
        if let Some(mut handle) = state.recording.take() {
            self.recorder.stop(&mut handle);
        }
    }

    fn persist_verified(&self) -> StorageResult<()> {
        self.cookies.set_cookie(
            &self.config.cookie_name,
            VERIFIED_COOKIE_VALUE,
            Duration::from_secs(self.config.cookie_max_age_secs),
        )
    }
}

// Verification form handler
//
// The form-side logic a rendering surface binds its code input to. On mount
// it reads the active code back out of storage so it can be displayed next to
// the input.

use crate::otp::OTP_LENGTH;
use crate::session::VerificationSessionController;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Path of the verification screen
pub const VERIFICATION_PATH: &str = "/human-verification";

/// Path the form sends the agent to after its success branch
pub const HOME_PATH: &str = "/";

/// Status banner state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    Idle,
    Success,
    Error,
}

/// Result of pressing "Verify"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    /// The input was incomplete; nothing was submitted
    Ignored,
    Submitted {
        status: FormStatus,
        redirect: Option<&'static str>,
    },
}

pub struct VerificationForm {
    controller: Arc<VerificationSessionController>,
    display_code: String,
    input: String,
    status: FormStatus,
    /// Error as of the last render
    rendered_error: Option<String>,
}

impl VerificationForm {
    /// Mount the form, reading the active code for display
    pub fn mount(controller: Arc<VerificationSessionController>) -> Self {
        let display_code = match controller.active_code() {
            Ok(code) => code.unwrap_or_default(),
            Err(e) => {
                warn!("Could not read active code for display: {}", e);
                String::new()
            }
        };
        let rendered_error = controller.context().error;

        Self {
            controller,
            display_code,
            input: String::new(),
            status: FormStatus::Idle,
            rendered_error,
        }
    }

    pub fn display_code(&self) -> &str {
        &self.display_code
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Replace the input, truncated to the code length
    pub fn set_input(&mut self, value: &str) {
        self.input = value.chars().take(OTP_LENGTH).collect();
    }

    pub fn status(&self) -> FormStatus {
        self.status
    }

    /// Verify is enabled only when idle and the input is complete
    pub fn can_submit(&self) -> bool {
        !self.controller.context().is_loading && self.input.chars().count() == OTP_LENGTH
    }

    /// Re-read the controller error, as a re-render would
    pub fn render(&mut self) {
        self.rendered_error = self.controller.context().error;
    }

    /// Submit the current input.
    ///
    /// The banner is decided from the error captured at the previous render,
    /// not from this submission's outcome: a previously rendered error shows
    /// success and redirects home, no previous error shows failure. This
    /// matches the observed behavior of the deployed form and is kept until
    /// the intended logic is confirmed.
    pub async fn submit(&mut self) -> FormOutcome {
        if self.input.chars().count() != OTP_LENGTH {
            return FormOutcome::Ignored;
        }

        self.status = FormStatus::Idle;
        let seen_error = self.rendered_error.clone();

        self.controller.submit(&self.input).await;

        let outcome = if seen_error.is_some() {
            self.status = FormStatus::Success;
            FormOutcome::Submitted {
                status: FormStatus::Success,
                redirect: Some(HOME_PATH),
            }
        } else {
            self.status = FormStatus::Error;
            FormOutcome::Submitted {
                status: FormStatus::Error,
                redirect: None,
            }
        };
        debug!("Form banner: {:?}", self.status);

        self.render();
        outcome
    }
}

// Route gate
//
// Decides what the rendering layer shows on top of any page: a spinner until
// the settle delay has elapsed, then a redirect to the verification screen for
// unverified agents, the form overlay when it was requested, or nothing.

use crate::clock::Timer;
use crate::form::VERIFICATION_PATH;
use crate::session::VerificationContext;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Settle delay still running; show a spinner
    Settling,
    /// Replace the current route
    Redirect(&'static str),
    /// Overlay the verification form
    ShowForm,
    /// Render the page as is
    PassThrough,
}

pub struct RouteGate {
    timer: Arc<dyn Timer>,
    settle_delay: Duration,
    settled: AtomicBool,
}

impl RouteGate {
    pub fn new(timer: Arc<dyn Timer>, settle_delay: Duration) -> Self {
        Self {
            timer,
            settle_delay,
            settled: AtomicBool::new(false),
        }
    }

    /// Wait out the settle delay
    pub async fn settle(&self) {
        self.timer.sleep(self.settle_delay).await;
        self.settled.store(true, Ordering::SeqCst);
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    pub fn evaluate(&self, context: &VerificationContext, current_path: &str) -> GateDecision {
        if !self.is_settled() {
            return GateDecision::Settling;
        }

        if !context.is_verified && current_path != VERIFICATION_PATH {
            debug!("Redirecting unverified agent from {}", current_path);
            return GateDecision::Redirect(VERIFICATION_PATH);
        }

        if context.show_verification {
            GateDecision::ShowForm
        } else {
            GateDecision::PassThrough
        }
    }
}

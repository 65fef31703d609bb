// Verification engine
//
// Produces the final human/bot verdict for a submitted code:
// 1. Wait out the simulated validation latency
// 2. Check the agent string for a bot signature
// 3. Run the movement pattern analysis (reported, not part of the verdict)
// 4. Compare the submitted code with the stored one
//
// Verdict = human-like agent AND matching code.

use crate::analyzer::{AnalysisResult, PatternAnalyzer};
use crate::clock::Timer;
use crate::events::EventHistory;
use crate::otp::OtpService;
use crate::storage::StorageError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info};

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Simulated remote validation latency in milliseconds
    pub simulated_latency_ms: u64,
    /// Case-insensitive substring marking an agent as a bot
    pub bot_signature: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            simulated_latency_ms: 1500,
            bot_signature: "bot".to_string(),
        }
    }
}

/// Verification failure that is not a plain "not human" verdict
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Failed to read stored code: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid bot signature: {0}")]
    InvalidSignature(#[from] regex::Error),
}

/// Source of the agent identifier string (the browser user agent)
pub trait AgentSource: Send + Sync {
    fn user_agent(&self) -> String;
}

/// Fixed agent string
#[derive(Debug, Clone)]
pub struct StaticAgent(pub String);

impl AgentSource for StaticAgent {
    fn user_agent(&self) -> String {
        self.0.clone()
    }
}

/// Engine verdict with the signals it was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_human: bool,
    pub human_like_agent: bool,
    pub code_matches: bool,
    /// Movement analysis at verification time
    pub analysis: AnalysisResult,
}

pub struct VerificationEngine {
    otp: Arc<OtpService>,
    history: Arc<EventHistory>,
    agent: Arc<dyn AgentSource>,
    timer: Arc<dyn Timer>,
    analyzer: PatternAnalyzer,
    latency: Duration,
    bot_signature: Regex,
}

impl VerificationEngine {
    pub fn new(
        otp: Arc<OtpService>,
        history: Arc<EventHistory>,
        agent: Arc<dyn AgentSource>,
        timer: Arc<dyn Timer>,
        analyzer: PatternAnalyzer,
        config: &EngineConfig,
    ) -> Result<Self, VerificationError> {
        let bot_signature = RegexBuilder::new(&regex::escape(&config.bot_signature))
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            otp,
            history,
            agent,
            timer,
            analyzer,
            latency: Duration::from_millis(config.simulated_latency_ms),
            bot_signature,
        })
    }

    /// Verify a submitted code.
    ///
    /// A missing stored code is a mismatch, not an error. Only storage faults
    /// return `Err`.
    pub async fn verify(&self, code: &str) -> Result<Verdict, VerificationError> {
        self.timer.sleep(self.latency).await;

        let user_agent = self.agent.user_agent();
        let human_like_agent = self.is_human_like_agent(&user_agent);

        // Computed for reporting; not combined into the verdict
        let analysis = self.analyzer.analyze(&self.history.snapshot());

        let stored = self.otp.retrieve()?;
        let code_matches = Self::codes_match(code, stored.as_deref());

        let is_human = human_like_agent && code_matches;

        debug!(
            human_like_agent,
            code_matches,
            pattern_human = analysis.is_human,
            average_speed = analysis.average_speed,
            sample_count = analysis.sample_count,
            "Verification signals"
        );
        info!("Verification verdict: is_human={}", is_human);

        Ok(Verdict {
            is_human,
            human_like_agent,
            code_matches,
            analysis,
        })
    }

    /// True unless the agent string contains the bot signature
    pub fn is_human_like_agent(&self, user_agent: &str) -> bool {
        !self.bot_signature.is_match(user_agent)
    }

    /// Exact equality, compared in constant time
    fn codes_match(submitted: &str, stored: Option<&str>) -> bool {
        match stored {
            Some(stored) => {
                let submitted = submitted.as_bytes();
                let stored = stored.as_bytes();
                submitted.len() == stored.len() && submitted.ct_eq(stored).into()
            }
            None => false,
        }
    }
}

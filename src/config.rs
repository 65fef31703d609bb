use crate::analyzer::AnalyzerConfig;
use crate::engine::EngineConfig;
use crate::events::RecorderConfig;
use crate::otp::OtpConfig;
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Verification gate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(&self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.recorder.capacity == 0 {
            anyhow::bail!("Invalid recorder capacity: must be > 0");
        }

        if self.analyzer.min_events < 2 {
            anyhow::bail!("Invalid analyzer min_events: need at least 2 events to form a pair");
        }

        if !self.analyzer.velocity_threshold.is_finite() || self.analyzer.velocity_threshold < 0.0 {
            anyhow::bail!(
                "Invalid analyzer velocity_threshold: {}",
                self.analyzer.velocity_threshold
            );
        }

        if self.otp.length == 0 || self.otp.length > 32 {
            anyhow::bail!("Invalid otp length {}: must be 1..=32", self.otp.length);
        }

        if self.otp.storage_key.trim().is_empty() {
            anyhow::bail!("Invalid otp storage_key: cannot be empty");
        }

        if self.engine.bot_signature.is_empty() {
            anyhow::bail!("Invalid engine bot_signature: cannot be empty");
        }

        if self.session.cookie_name.trim().is_empty() {
            anyhow::bail!("Invalid session cookie_name: cannot be empty");
        }

        if self.session.cookie_max_age_secs == 0 {
            anyhow::bail!("Invalid session cookie_max_age_secs: must be > 0");
        }

        Ok(())
    }
}

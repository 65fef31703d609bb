// One-time code generation and storage
//
// Exactly one code is active at a time. Storing a new code overwrites the
// previous one; nothing here expires a code.

use crate::storage::{KeyValueStore, StorageResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Local storage key holding the active code
pub const OTP_STORAGE_KEY: &str = "otp";

/// Number of digits in a code
pub const OTP_LENGTH: usize = 6;

const DIGITS: &[u8; 10] = b"0123456789";

/// Code generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfig {
    /// Number of digits
    pub length: usize,
    /// Local storage key for the active code
    pub storage_key: String,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            length: OTP_LENGTH,
            storage_key: OTP_STORAGE_KEY.to_string(),
        }
    }
}

/// Generates, stores and retrieves the active one-time code
pub struct OtpService {
    store: Arc<dyn KeyValueStore>,
    config: OtpConfig,
}

impl OtpService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(store, OtpConfig::default())
    }

    pub fn with_config(store: Arc<dyn KeyValueStore>, config: OtpConfig) -> Self {
        Self { store, config }
    }

    pub fn code_length(&self) -> usize {
        self.config.length
    }

    /// Random numeric code, each digit drawn uniformly (leading zeros allowed)
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.config.length)
            .map(|_| DIGITS[rng.gen_range(0..DIGITS.len())] as char)
            .collect()
    }

    /// Persist `code` as the active code, replacing any previous one
    pub fn store(&self, code: &str) -> StorageResult<()> {
        self.store.set(&self.config.storage_key, code)
    }

    /// Active code, if one was stored
    pub fn retrieve(&self) -> StorageResult<Option<String>> {
        self.store.get(&self.config.storage_key)
    }

    /// Generate a fresh code and make it the active one
    pub fn issue(&self) -> StorageResult<String> {
        let code = self.generate();
        self.store(&code)?;
        debug!("Issued new one-time code");
        Ok(code)
    }

    /// True if `code` has the configured length and only digits
    pub fn is_well_formed(&self, code: &str) -> bool {
        code.len() == self.config.length && code.bytes().all(|b| b.is_ascii_digit())
    }
}

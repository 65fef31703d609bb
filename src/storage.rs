// Client-side storage surfaces
//
// Two slots survive a reload:
// - local storage (`KeyValueStore`), which holds the active one-time code
// - cookies with a max-age (`CookieStore`), which hold the verified flag
//
// `MemoryStore` keeps both in process memory. `FileStore` writes every change
// through to a JSON document so a new process sees the previous state.

use crate::clock::Clock;
use crate::lock_utils::lock_or_recover;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Storage failure
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed storage document: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Local storage: string keys to string values
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Cookie jar with max-age expiry
pub trait CookieStore: Send + Sync {
    /// Current value, or `None` if unset or expired
    fn get_cookie(&self, name: &str) -> StorageResult<Option<String>>;
    fn set_cookie(&self, name: &str, value: &str, max_age: Duration) -> StorageResult<()>;
}

/// Stored cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieEntry {
    pub value: String,
    /// Expiry (ms since epoch)
    pub expires_at_ms: u64,
}

impl CookieEntry {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Everything a store holds, in its on-disk shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageDocument {
    #[serde(default)]
    pub local: HashMap<String, String>,
    #[serde(default)]
    pub cookies: HashMap<String, CookieEntry>,
}

impl StorageDocument {
    fn cookie_value(&self, name: &str, now_ms: u64) -> Option<String> {
        self.cookies
            .get(name)
            .filter(|entry| !entry.is_expired(now_ms))
            .map(|entry| entry.value.clone())
    }

    fn insert_cookie(&mut self, name: &str, value: &str, max_age: Duration, now_ms: u64) {
        let max_age_ms = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
        let expires_at_ms = now_ms.saturating_add(max_age_ms);
        self.cookies.insert(
            name.to_string(),
            CookieEntry {
                value: value.to_string(),
                expires_at_ms,
            },
        );
    }

    /// Drop expired cookies. Returns how many were removed.
    fn purge_expired(&mut self, now_ms: u64) -> usize {
        let before = self.cookies.len();
        self.cookies.retain(|_, entry| !entry.is_expired(now_ms));
        before - self.cookies.len()
    }
}

/// In-process store
pub struct MemoryStore {
    doc: Mutex<StorageDocument>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            doc: Mutex::new(StorageDocument::default()),
            clock,
        }
    }

    /// Copy of the current contents
    pub fn document(&self) -> StorageDocument {
        lock_or_recover(&self.doc, "memory store").clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(lock_or_recover(&self.doc, "memory store").local.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        lock_or_recover(&self.doc, "memory store")
            .local
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        lock_or_recover(&self.doc, "memory store").local.remove(key);
        Ok(())
    }
}

impl CookieStore for MemoryStore {
    fn get_cookie(&self, name: &str) -> StorageResult<Option<String>> {
        let now = self.clock.now_millis();
        Ok(lock_or_recover(&self.doc, "memory store").cookie_value(name, now))
    }

    fn set_cookie(&self, name: &str, value: &str, max_age: Duration) -> StorageResult<()> {
        let now = self.clock.now_millis();
        lock_or_recover(&self.doc, "memory store").insert_cookie(name, value, max_age, now);
        Ok(())
    }
}

/// JSON-file-backed store with write-through
pub struct FileStore {
    path: PathBuf,
    doc: Mutex<StorageDocument>,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    /// Open (or lazily create) the state file at `path`
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut doc = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                StorageDocument::default()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            StorageDocument::default()
        };

        let purged = doc.purge_expired(clock.now_millis());
        if purged > 0 {
            debug!("Dropped {} expired cookie(s) from {:?}", purged, path);
        }

        info!("Opened verification state file: {:?}", path);

        Ok(Self {
            path,
            doc: Mutex::new(doc),
            clock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` and write the result to disk
    fn update<F>(&self, change: F) -> StorageResult<()>
    where
        F: FnOnce(&mut StorageDocument),
    {
        let mut doc = lock_or_recover(&self.doc, "file store");
        let mut next = doc.clone();
        change(&mut next);

        // Memory only moves forward once the file has the new state
        let contents = serde_json::to_string_pretty(&next)?;
        fs::write(&self.path, contents).map_err(|e| {
            warn!("Failed to persist verification state to {:?}: {}", self.path, e);
            StorageError::Io(e)
        })?;
        *doc = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(lock_or_recover(&self.doc, "file store").local.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.update(|doc| {
            doc.local.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.update(|doc| {
            doc.local.remove(key);
        })
    }
}

impl CookieStore for FileStore {
    fn get_cookie(&self, name: &str) -> StorageResult<Option<String>> {
        let now = self.clock.now_millis();
        Ok(lock_or_recover(&self.doc, "file store").cookie_value(name, now))
    }

    fn set_cookie(&self, name: &str, value: &str, max_age: Duration) -> StorageResult<()> {
        let now = self.clock.now_millis();
        self.update(|doc| doc.insert_cookie(name, value, max_age, now))
    }
}

//! Lock poisoning recovery for the shared verification state.
//!
//! The event buffer, the input surface listener table, the storage documents
//! and the session state are all shared behind std locks. An input callback
//! that panics while holding one of them must not take the whole gate down:
//! the next caller logs the poisoning and keeps working with the data as it
//! was left.
//!
//! All poisoning events are logged at ERROR level.

use std::sync::{LockResult, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::error;

/// Take the guard out of a lock result, logging if a previous holder panicked
fn recover<G>(result: LockResult<G>, lock: &'static str, context: &str) -> G {
    result.unwrap_or_else(|poisoned| {
        error!(lock, context, "Lock poisoned by a panicked holder; continuing with last written state");
        poisoned.into_inner()
    })
}

/// Lock `mutex`, recovering from poisoning.
///
/// `context` names what the lock protects and only appears in the log.
///
/// ```ignore
/// let events = lock_or_recover(&self.events, "event history");
/// ```
pub fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    recover(mutex.lock(), "mutex", context)
}

pub fn read_lock_or_recover<'a, T>(rwlock: &'a RwLock<T>, context: &str) -> RwLockReadGuard<'a, T> {
    recover(rwlock.read(), "rwlock-read", context)
}

pub fn write_lock_or_recover<'a, T>(
    rwlock: &'a RwLock<T>,
    context: &str,
) -> RwLockWriteGuard<'a, T> {
    recover(rwlock.write(), "rwlock-write", context)
}

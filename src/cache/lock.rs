//! Poison-tolerant locking for backend state.
//!
//! A panic inside a hook never holds a backend lock, but a panic inside a
//! backend would poison it. Cache contents are recomputable, so the guard is
//! recovered instead of propagating the poison to every later request.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) fn lock_state<'a, T>(
    lock: &'a Mutex<T>,
    backend: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        tracing::warn!(
            backend,
            op,
            "Recovered poisoned cache lock; entries may be stale"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn read_state<'a, T>(
    lock: &'a RwLock<T>,
    backend: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::warn!(backend, op, "Recovered poisoned cache lock; entries may be stale");
        poisoned.into_inner()
    })
}

pub(crate) fn write_state<'a, T>(
    lock: &'a RwLock<T>,
    backend: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::warn!(backend, op, "Recovered poisoned cache lock; entries may be stale");
        poisoned.into_inner()
    })
}

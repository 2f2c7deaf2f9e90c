//! Named mutual-exclusion locks for mutation and volume lifecycle paths.

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async lock with a stable name. Waiters are served in arrival order and
/// the guard releases on drop, including on early `?` returns.
#[derive(Debug, Clone)]
pub struct MutationLock {
    name: Arc<str>,
    inner: Arc<AsyncMutex<()>>,
}

impl MutationLock {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn acquire(&self) -> MutationGuard {
        let started = Instant::now();
        let guard = self.inner.clone().lock_owned().await;
        debug!(
            "event=lock_acquired lock={} waited_ms={}",
            self.name,
            started.elapsed().as_millis()
        );
        MutationGuard {
            name: self.name.clone(),
            acquired_at: Instant::now(),
            _guard: guard,
        }
    }

    /// Non-blocking attempt, used to report contention.
    pub fn try_acquire(&self) -> Option<MutationGuard> {
        let guard = self.inner.clone().try_lock_owned().ok()?;
        Some(MutationGuard {
            name: self.name.clone(),
            acquired_at: Instant::now(),
            _guard: guard,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

pub struct MutationGuard {
    name: Arc<str>,
    acquired_at: Instant,
    _guard: OwnedMutexGuard<()>,
}

impl MutationGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        debug!(
            "event=lock_released lock={} held_ms={}",
            self.name,
            self.acquired_at.elapsed().as_millis()
        );
    }
}

/// Hands out one shared lock per name so independently constructed
/// components contend on the same lock.
#[derive(Debug, Default, Clone)]
pub struct LockRegistry {
    locks: Arc<Mutex<HashMap<String, MutationLock>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(&self, name: &str) -> MutationLock {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| MutationLock::new(name))
            .clone()
    }
}

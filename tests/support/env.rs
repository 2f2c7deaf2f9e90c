#![allow(dead_code)]

use parking_lot::{const_mutex, Mutex, MutexGuard};
use std::env;

static ENV_LOCK: Mutex<()> = const_mutex(());

/// RAII guard that serialises environment mutations for tests. Holds every
/// touched variable so a test can override several at once.
pub struct EnvVarGuard {
    saved: Vec<(&'static str, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvVarGuard {
    pub fn new() -> Self {
        Self {
            saved: Vec::new(),
            _lock: ENV_LOCK.lock(),
        }
    }

    /// Sets `key` and restores its original value on drop.
    pub fn set(mut self, key: &'static str, value: &str) -> Self {
        self.remember(key);
        env::set_var(key, value);
        self
    }

    /// Clears `key` and restores its original value on drop.
    pub fn clear(mut self, key: &'static str) -> Self {
        self.remember(key);
        env::remove_var(key);
        self
    }

    fn remember(&mut self, key: &'static str) {
        if !self.saved.iter().any(|(saved, _)| *saved == key) {
            self.saved.push((key, env::var(key).ok()));
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, original) in self.saved.drain(..).rev() {
            match original {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
    }
}

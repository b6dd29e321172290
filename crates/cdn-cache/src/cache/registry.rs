//! # In-Flight Write Registry
//!
//! Process-wide set of cache keys that currently have a writer. One mutex
//! guards the whole set; every critical section is a single set operation and
//! no I/O ever happens under the lock.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct InFlightRegistry {
    keys: Mutex<HashSet<String>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` unless another writer already owns it.
    ///
    /// The returned guard releases the key when dropped.
    pub fn try_acquire(self: &Arc<Self>, key: &str) -> Option<InFlightGuard> {
        if !self.keys.lock().insert(key.to_owned()) {
            return None;
        }
        Some(InFlightGuard {
            registry: Arc::clone(self),
            key: key.to_owned(),
            released: false,
        })
    }

    /// Remove `key`, returning whether it was registered
    fn release(&self, key: &str) -> bool {
        self.keys.lock().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}

/// Ownership of one in-flight key
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    key: String,
    released: bool,
}

impl InFlightGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Detach the key now. Later calls and the eventual drop are no-ops.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(&self.key);
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.release();
    }
}

//! Keyed mutual exclusion with a timeout.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use depot_core::StoreKey;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use crate::error::{RegistryError, Result};

/// Held for the duration of one keyed operation.
///
/// Dropping it releases the lock and forgets the key once nobody else is
/// holding or waiting on it.
pub struct KeyGuard<'a> {
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
    key: StoreKey,
    locks: &'a DashMap<StoreKey, Arc<Mutex<()>>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// One lock per store key, created on first use.
#[derive(Debug)]
pub struct KeyLocks {
    locks: DashMap<StoreKey, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl KeyLocks {
    pub fn new(timeout: Duration) -> Self {
        KeyLocks {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Acquire the lock for `key`, failing with `LockTimeout` after the configured wait.
    pub fn lock(&self, key: &StoreKey) -> Result<KeyGuard<'_>> {
        let mutex = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let acquired = mutex.try_lock_arc_for(self.timeout);
        // Drop our handle before a failed attempt tries to evict.
        drop(mutex);
        let guard = KeyGuard {
            guard: acquired,
            key: key.clone(),
            locks: &self.locks,
        };
        if guard.guard.is_none() {
            return Err(RegistryError::LockTimeout {
                key: key.to_string(),
                waited_ms: self.timeout.as_millis() as u64,
            });
        }
        Ok(guard)
    }

    /// Keys currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

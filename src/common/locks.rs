//! Keyed async mutex table
//!
//! Serializes work per key (player id, session id) without contending
//! across keys.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. The guard releases on drop.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard lock is not held across the await.
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Like `lock`, but the entry is also removed from the table when the
    /// returned guard drops, including when the holding future is cancelled.
    pub async fn lock_scoped(&self, key: &str) -> KeyedGuard<'_> {
        let release = Release {
            locks: self,
            key: key.to_string(),
        };
        let guard = self.lock(key).await;
        KeyedGuard {
            _guard: guard,
            _release: release,
        }
    }

    /// Drop the table entry for `key` when nobody holds or waits on it.
    pub fn release(&self, key: &str) {
        self.locks.remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held lock that prunes its table entry on drop
pub struct KeyedGuard<'a> {
    // Field order matters: the mutex guard drops before the release runs.
    _guard: OwnedMutexGuard<()>,
    _release: Release<'a>,
}

struct Release<'a> {
    locks: &'a KeyedLocks,
    key: String,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}

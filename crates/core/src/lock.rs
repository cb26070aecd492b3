//! Per-key mutual exclusion with bounded bookkeeping.
//!
//! Cache operations are serialized per fingerprint while staying fully
//! concurrent across distinct fingerprints. The tracked key set is bounded
//! so the map never grows with the key space: at capacity, the first entry
//! whose lock is currently unheld is dropped to make room.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Default maximum number of tracked keys.
pub const DEFAULT_MAX_LOCKS: usize = 255;

/// A pool of string-keyed async mutexes.
///
/// The bookkeeping map sits behind its own mutex, held only for the
/// lookup/insert window and never across a caller's critical section. If
/// every tracked lock is held when a new key arrives, the new lock is
/// inserted anyway; callers are never blocked on bookkeeping.
#[derive(Debug)]
pub struct KeyedLocks {
    max_locks: usize,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOCKS)
    }
}

impl KeyedLocks {
    /// Create a pool tracking at most `max_locks` keys.
    pub fn new(max_locks: usize) -> Self {
        Self { max_locks, locks: Mutex::new(HashMap::new()) }
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    ///
    /// The returned guard keeps its mutex alive even if bookkeeping evicts
    /// the key in the meantime, so exclusion holds for as long as the
    /// guard does.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(key).await;
        lock.lock_owned().await
    }

    /// Look up or create the shared mutex for `key`.
    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;

        if let Some(lock) = locks.get(key) {
            return lock.clone();
        }

        if locks.len() >= self.max_locks {
            // No ordering guarantee: any currently-unheld entry may go.
            let unlocked = locks
                .iter()
                .find(|(_, lock)| lock.try_lock().is_ok())
                .map(|(key, _)| key.clone());

            if let Some(evicted) = unlocked {
                locks.remove(&evicted);
                tracing::debug!(key = %evicted, "evicted unheld lock to stay under capacity");
            }
        }

        let lock = Arc::new(Mutex::new(()));
        locks.insert(key.to_string(), lock.clone());
        lock
    }

    /// Number of keys currently tracked.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

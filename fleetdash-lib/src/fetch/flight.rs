//! Per-key in-flight fetch coalescing.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

/// Table of per-key locks held while an upstream fetch is running.
///
/// A task that misses both tiers takes the key's lock before calling
/// upstream; tasks arriving meanwhile queue on the same lock and re-check
/// the memory tier once they get it. Locks are dropped from the table when
/// their last holder releases them, so the table only holds keys with a
/// fetch in progress.
#[derive(Debug, Default, Clone)]
pub(crate) struct InFlight {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive ownership of `key`.
    pub(crate) async fn acquire(&self, key: &str) -> FlightGuard {
        let lock = self.locks.entry(key.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        FlightGuard {
            locks: Arc::clone(&self.locks),
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Returns the number of keys with a fetch in progress or queued.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Releases the key on drop.
pub(crate) struct FlightGuard {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        // One reference in the table, one in our guard: nobody is waiting.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

//! In-process TTL tier using DashMap

use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;

use super::CacheEntry;

/// The fast, process-local cache tier.
///
/// Entries soft-expire: once past `cached_at + ttl_seconds` they are
/// reported as absent but stay in the map until overwritten or
/// invalidated. There is no sweeping and no size bound.
///
/// Construct one per process (or per test) and share it by `Arc`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use fleetdash_lib::cache::MemoryTier;
///
/// let memory = MemoryTier::new();
/// memory.set("api_zones", b"[]".to_vec(), Duration::from_secs(300));
/// assert!(memory.get("api_zones").is_some());
///
/// memory.invalidate("api_zones");
/// assert!(memory.get("api_zones").is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryTier {
    store: DashMap<String, CacheEntry>,
}

impl MemoryTier {
    /// Creates a new empty memory tier.
    pub fn new() -> Self {
        Self {
            store: DashMap::new(),
        }
    }

    /// Returns the entry for `key` if it is still fresh.
    ///
    /// Expired entries are left in place.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.store.get(key)?;
        if entry.is_fresh_at(Utc::now()) {
            Some(entry.value().clone())
        } else {
            None
        }
    }

    /// Returns the entry for `key` regardless of age.
    ///
    /// Only for stale fallbacks; normal reads go through [`get`](Self::get).
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.store.get(key).map(|entry| entry.value().clone())
    }

    /// Stores `payload` under `key`, fresh for `ttl` from now.
    pub fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) {
        self.insert(CacheEntry::new_now(key, payload, ttl));
    }

    /// Stores a prepared entry, replacing any previous one.
    pub fn insert(&self, entry: CacheEntry) {
        self.store.insert(entry.key.clone(), entry);
    }

    /// Removes the entry for `key`, if any.
    pub fn invalidate(&self, key: &str) {
        self.store.remove(key);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Returns the number of entries in the tier (including expired ones).
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if the tier is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns the keys currently held, expired or not, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.store.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

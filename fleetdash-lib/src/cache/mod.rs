//! Tiered freshness cache
//!
//! Two tiers share one entry shape. The [`MemoryTier`] is a process-local
//! TTL map that soft-expires entries; the [`DurableStore`] keeps every
//! payload on disk regardless of age so it can be served when the upstream
//! provider is unavailable, and rehydrated into memory at startup.

mod category;
mod config;
mod durable;
mod memory;
mod sqlite;

pub use category::*;
pub use config::*;
pub use durable::*;
pub use memory::*;
pub use sqlite::*;

use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;

/// The unit stored in both cache tiers.
///
/// The payload is the upstream response serialized as JSON bytes; the cache
/// never looks inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Deterministic encoding of the logical query.
    pub key: String,
    /// Serialized upstream response.
    pub payload: Vec<u8>,
    /// When the payload was last written.
    pub cached_at: DateTime<Utc>,
    /// Freshness budget assigned at write time.
    pub ttl_seconds: u64,
}

impl CacheEntry {
    /// Creates a new entry.
    pub fn new(
        key: impl Into<String>,
        payload: Vec<u8>,
        cached_at: DateTime<Utc>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            key: key.into(),
            payload,
            cached_at,
            ttl_seconds,
        }
    }

    /// Creates a new entry with the current time as `cached_at`.
    pub fn new_now(key: impl Into<String>, payload: Vec<u8>, ttl: Duration) -> Self {
        Self::new(key, payload, Utc::now(), ttl.as_secs())
    }

    /// Returns the instant after which the entry is no longer fresh.
    pub fn expires_at(&self) -> DateTime<Utc> {
        ttl_delta(self.ttl_seconds)
            .and_then(|ttl| self.cached_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Returns how long ago the entry was written, relative to `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.cached_at
    }

    /// Returns `true` if the entry is within its TTL at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at()
    }
}

/// Converts a TTL in seconds to a chrono duration, `None` if out of range.
pub(crate) fn ttl_delta(seconds: u64) -> Option<chrono::Duration> {
    i64::try_from(seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
}

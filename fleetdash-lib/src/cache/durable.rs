//! Durable tier interface

use async_trait::async_trait;
use chrono::Utc;

use super::CacheEntry;
use crate::error::StoreError;

/// Trait for the on-disk cache tier.
///
/// Rows never expire on their own. Freshness is a read-time decision made
/// by choosing one of the two read modes:
///
/// - [`get`](Self::get) returns the row at any age (stale reads, warmup)
/// - [`get_fresh`](Self::get_fresh) returns it only within its recorded TTL
///
/// Writes are single-key upserts, last write wins. Implementations must be
/// safe under concurrent writers on different keys.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Retrieves the row for `key` regardless of age.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Retrieves the row for `key` only if it is within its TTL.
    async fn get_fresh(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let now = Utc::now();
        Ok(self.get(key).await?.filter(|entry| entry.is_fresh_at(now)))
    }

    /// Retrieves the most recently written row whose key starts with `prefix`.
    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Upserts a row.
    async fn set(&self, entry: CacheEntry) -> Result<(), StoreError>;

    /// Removes the row for `key`, if any.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Lists the keys starting with `prefix`, sorted ascending.
    async fn list_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Removes every row, returning how many were deleted.
    async fn clear(&self) -> Result<usize, StoreError>;
}

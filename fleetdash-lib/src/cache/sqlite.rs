//! SQLite-backed durable tier.

use std::path::Path;

use async_sqlite::Client;
use async_sqlite::ClientBuilder;
use async_sqlite::JournalMode;
use async_sqlite::rusqlite;
use async_sqlite::rusqlite::OptionalExtension;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;

use super::CacheEntry;
use super::DurableStore;
use crate::error::StoreError;

/// A durable cache tier backed by SQLite.
///
/// One table, one row per key:
/// `(key TEXT PRIMARY KEY, payload BLOB, cached_at REAL, ttl_seconds INTEGER)`.
/// `cached_at` is unix seconds with microsecond precision. File databases
/// use WAL journal mode so readers don't block the writer.
///
/// # Example
///
/// ```ignore
/// use fleetdash_lib::cache::SqliteStore;
///
/// // File-based store
/// let store = SqliteStore::open("fleet_cache.db").await?;
///
/// // In-memory store (for testing)
/// let store = SqliteStore::open_in_memory().await?;
/// ```
#[derive(Clone)]
pub struct SqliteStore {
    client: Client,
}

impl SqliteStore {
    /// Opens a store at the specified path.
    ///
    /// Creates the database file and table if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let client = ClientBuilder::new()
            .path(path)
            .journal_mode(JournalMode::Wal)
            .open()
            .await?;

        Self::init_schema(&client).await?;

        Ok(Self { client })
    }

    /// Opens an in-memory store.
    ///
    /// Useful for testing. Data is lost when the store is dropped.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let client = ClientBuilder::new().path(":memory:").open().await?;

        Self::init_schema(&client).await?;

        Ok(Self { client })
    }

    async fn init_schema(client: &Client) -> Result<(), StoreError> {
        client
            .conn(|conn| {
                conn.execute_batch(
                    "
                    CREATE TABLE IF NOT EXISTS response_cache (
                        key TEXT PRIMARY KEY,
                        payload BLOB NOT NULL,
                        cached_at REAL NOT NULL,
                        ttl_seconds INTEGER NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_response_cache_cached_at
                        ON response_cache (cached_at);
                    ",
                )
            })
            .await?;
        Ok(())
    }

    /// Returns the number of rows in the store.
    pub async fn len(&self) -> Result<usize, StoreError> {
        let count = self
            .client
            .conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM response_cache", [], |row| {
                    row.get::<_, i64>(0)
                })
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Returns `true` if the store is empty.
    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        self.len().await.map(|len| len == 0)
    }
}

type Row = (String, Vec<u8>, f64, i64);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_entry((key, payload, cached_at, ttl_seconds): Row) -> Result<CacheEntry, StoreError> {
    let cached_at = from_unix_seconds(cached_at)?;
    let ttl_seconds = u64::try_from(ttl_seconds).unwrap_or(0);
    Ok(CacheEntry::new(key, payload, cached_at, ttl_seconds))
}

pub(crate) fn to_unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

pub(crate) fn from_unix_seconds(seconds: f64) -> Result<DateTime<Utc>, StoreError> {
    if !seconds.is_finite() {
        return Err(StoreError::InvalidTimestamp(seconds));
    }
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
        .ok_or(StoreError::InvalidTimestamp(seconds))
}

/// Matches keys starting with `?1`. `LIKE` would fold ASCII case and
/// treat `_` as a wildcard.
const PREFIX_MATCH: &str = "substr(key, 1, length(?1)) = ?1";

#[async_trait]
impl DurableStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let key = key.to_string();

        let row = self
            .client
            .conn(move |conn| {
                conn.query_row(
                    "SELECT key, payload, cached_at, ttl_seconds FROM response_cache WHERE key = ?",
                    [key],
                    read_row,
                )
                .optional()
            })
            .await?;

        row.map(into_entry).transpose()
    }

    async fn get_fresh(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let key = key.to_string();
        let now = to_unix_seconds(Utc::now());

        let row = self
            .client
            .conn(move |conn| {
                conn.query_row(
                    "SELECT key, payload, cached_at, ttl_seconds FROM response_cache
                     WHERE key = ? AND cached_at + ttl_seconds >= ?",
                    rusqlite::params![key, now],
                    read_row,
                )
                .optional()
            })
            .await?;

        row.map(into_entry).transpose()
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<CacheEntry>, StoreError> {
        let prefix = prefix.to_string();

        let row = self
            .client
            .conn(move |conn| {
                let sql = format!(
                    "SELECT key, payload, cached_at, ttl_seconds FROM response_cache
                     WHERE {PREFIX_MATCH}
                     ORDER BY cached_at DESC, rowid DESC LIMIT 1"
                );
                conn.query_row(&sql, [prefix], read_row).optional()
            })
            .await?;

        row.map(into_entry).transpose()
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), StoreError> {
        let cached_at = to_unix_seconds(entry.cached_at);
        let ttl_seconds = i64::try_from(entry.ttl_seconds).unwrap_or(i64::MAX);
        let CacheEntry { key, payload, .. } = entry;

        self.client
            .conn(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO response_cache (key, payload, cached_at, ttl_seconds)
                     VALUES (?, ?, ?, ?)",
                    rusqlite::params![key, payload, cached_at, ttl_seconds],
                )
            })
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();

        self.client
            .conn(move |conn| conn.execute("DELETE FROM response_cache WHERE key = ?", [key]))
            .await?;
        Ok(())
    }

    async fn list_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let prefix = prefix.to_string();

        let keys = self
            .client
            .conn(move |conn| {
                let sql = format!("SELECT key FROM response_cache WHERE {PREFIX_MATCH} ORDER BY key");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([prefix], |row| row.get(0))?;
                rows.collect::<Result<Vec<String>, _>>()
            })
            .await?;
        Ok(keys)
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let removed = self
            .client
            .conn(|conn| conn.execute("DELETE FROM response_cache", []))
            .await?;
        Ok(removed)
    }
}

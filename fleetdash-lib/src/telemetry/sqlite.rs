//! SQLite call log.

use std::path::Path;

use async_sqlite::Client;
use async_sqlite::ClientBuilder;
use async_sqlite::JournalMode;
use async_sqlite::rusqlite;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;

use super::CallEvent;
use super::CallTelemetry;
use crate::error::StoreError;

/// A persisted call record.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub operation: String,
    pub outcome: String,
    pub latency_ms: i64,
    pub error: Option<String>,
    pub cached: bool,
}

/// Call counts for one service/outcome pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSummary {
    pub service: String,
    pub outcome: String,
    pub count: i64,
    pub avg_ms: f64,
    pub max_ms: i64,
}

/// Telemetry sink that appends every event to a SQLite table.
///
/// Timestamps are fixed-width RFC 3339 strings so they compare
/// lexicographically.
///
/// Used to watch upstream quota consumption: how many calls were live,
/// how many were absorbed by a cache tier, and how many degraded.
#[derive(Clone)]
pub struct SqliteCallLog {
    client: Client,
}

impl SqliteCallLog {
    /// Opens a call log at the specified path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let client = ClientBuilder::new()
            .path(path)
            .journal_mode(JournalMode::Wal)
            .open()
            .await?;

        Self::init_schema(&client).await?;

        Ok(Self { client })
    }

    /// Opens an in-memory call log.
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
                    CREATE TABLE IF NOT EXISTS api_calls (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        timestamp TEXT NOT NULL,
                        service TEXT NOT NULL,
                        operation TEXT NOT NULL,
                        outcome TEXT NOT NULL,
                        latency_ms INTEGER NOT NULL,
                        error TEXT,
                        cached INTEGER NOT NULL DEFAULT 0
                    );

                    CREATE INDEX IF NOT EXISTS idx_api_calls_timestamp ON api_calls (timestamp);
                    CREATE INDEX IF NOT EXISTS idx_api_calls_service ON api_calls (service);
                    ",
                )
            })
            .await?;
        Ok(())
    }

    /// Appends one event.
    pub async fn append(&self, event: CallEvent) -> Result<(), StoreError> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let latency_ms = i64::try_from(event.latency.as_millis()).unwrap_or(i64::MAX);
        let cached = event.outcome.is_cached();
        let outcome = event.outcome.as_str();

        self.client
            .conn(move |conn| {
                conn.execute(
                    "INSERT INTO api_calls
                     (timestamp, service, operation, outcome, latency_ms, error, cached)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                    rusqlite::params![
                        timestamp,
                        event.service,
                        event.operation,
                        outcome,
                        latency_ms,
                        event.error,
                        cached
                    ],
                )
            })
            .await?;
        Ok(())
    }

    /// Counts calls grouped by service and outcome over the last `hours`.
    pub async fn summary(&self, hours: u32) -> Result<Vec<CallSummary>, StoreError> {
        let cutoff = (Utc::now() - chrono::Duration::hours(i64::from(hours)))
            .to_rfc3339_opts(SecondsFormat::Micros, true);

        let rows = self
            .client
            .conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT service, outcome, COUNT(*) AS cnt,
                            AVG(latency_ms) AS avg_ms, MAX(latency_ms) AS max_ms
                     FROM api_calls WHERE timestamp >= ?
                     GROUP BY service, outcome ORDER BY cnt DESC, service, outcome",
                )?;
                let rows = stmt.query_map([cutoff], |row| {
                    Ok(CallSummary {
                        service: row.get(0)?,
                        outcome: row.get(1)?,
                        count: row.get(2)?,
                        avg_ms: row.get(3)?,
                        max_ms: row.get(4)?,
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await?;
        Ok(rows)
    }

    /// Returns the last `limit` calls, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<CallRecord>, StoreError> {
        let rows = self
            .client
            .conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, timestamp, service, operation, outcome, latency_ms, error, cached
                     FROM api_calls ORDER BY id DESC LIMIT ?",
                )?;
                let rows = stmt.query_map([limit], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, bool>(7)?,
                    ))
                })?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await?;

        rows.into_iter()
            .map(
                |(id, timestamp, service, operation, outcome, latency_ms, error, cached)| {
                    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_default();
                    Ok(CallRecord {
                        id,
                        timestamp,
                        service,
                        operation,
                        outcome,
                        latency_ms,
                        error,
                        cached,
                    })
                },
            )
            .collect()
    }
}

#[async_trait]
impl CallTelemetry for SqliteCallLog {
    async fn record(&self, event: CallEvent) {
        if let Err(e) = self.append(event).await {
            log::warn!("failed to record call telemetry: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::telemetry::Outcome;

    #[tokio::test]
    async fn test_summary_groups_by_outcome() {
        let log = SqliteCallLog::open_in_memory().await.unwrap();
        for ms in [10, 30] {
            log.record(CallEvent::new("fleet", "get_vehicles", Outcome::Success, Duration::from_millis(ms)))
                .await;
        }
        log.record(CallEvent::new("fleet", "get_vehicles", Outcome::Cached, Duration::ZERO))
            .await;

        let summary = log.summary(24).await.unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].outcome, "success");
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].avg_ms, 20.0);
        assert_eq!(summary[0].max_ms, 30);
        assert_eq!(summary[1].outcome, "cached");
    }

    #[tokio::test]
    async fn test_recent_newest_first() {
        let log = SqliteCallLog::open_in_memory().await.unwrap();
        log.record(CallEvent::new("fleet", "get_zones", Outcome::Success, Duration::ZERO))
            .await;
        log.record(
            CallEvent::new("fleet", "get_trips", Outcome::Error, Duration::from_millis(5))
                .with_error("HTTP 429: quota"),
        )
        .await;

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].operation, "get_trips");
        assert_eq!(recent[0].error.as_deref(), Some("HTTP 429: quota"));
        assert!(!recent[0].cached);
        assert_eq!(recent[1].operation, "get_zones");
    }
}

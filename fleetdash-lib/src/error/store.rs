//! Durable store error types

/// Errors from the SQLite-backed durable tier and call log.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database returned an error.
    #[error("database error: {0}")]
    Database(#[from] async_sqlite::Error),

    /// A row carried a timestamp that cannot be represented.
    #[error("invalid stored timestamp: {0}")]
    InvalidTimestamp(f64),
}

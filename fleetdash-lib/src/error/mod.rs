//! Error types

mod store;
mod upstream;

pub use store::*;
pub use upstream::*;

/// Errors surfaced to callers of the cache and the fleet facade.
///
/// A missing entry is never an error: both tiers report absence as `None`
/// and the orchestrator falls through to the next tier. A degraded (stale)
/// result is a success, see [`crate::CacheStatus::Stale`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The upstream call failed and no cached value exists for the key.
    #[error("{operation} unavailable for '{key}': {source}")]
    Unavailable {
        /// Cache key of the failed query.
        key: String,
        /// Name of the upstream operation.
        operation: String,
        /// The upstream failure, verbatim.
        #[source]
        source: UpstreamError,
    },

    /// The durable store or call log failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A payload could not be encoded or decoded.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl Error {
    /// Returns the upstream failure if this is an [`Error::Unavailable`].
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            Self::Unavailable { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Converts this error into an upstream failure.
    ///
    /// Used by aggregate queries whose inner lookups run inside another
    /// orchestrated fetch.
    pub fn into_upstream(self) -> UpstreamError {
        match self {
            Self::Unavailable { source, .. } => source,
            other => UpstreamError::Other(other.to_string()),
        }
    }
}

//! Upstream collaborator error types

use std::time::Duration;

/// Failures returned by the upstream telemetry provider.
///
/// The orchestrator does not branch on the variant: every failure sends it
/// to the stale read. The variants exist for callers and telemetry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpstreamError {
    /// HTTP error response from the provider.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Network error during the call.
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The provider (or the local call budget) refused the call.
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Description of the limit that was hit.
        message: String,
        /// How long until a call may succeed, if known.
        retry_after: Option<Duration>,
    },

    /// The call timed out.
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// The provider answered with something that could not be parsed.
    #[error("Response parse error: {0}")]
    Parse(String),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    /// Creates a new HTTP error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates a new network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a new rate-limit error.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    /// Returns the HTTP status code if this is an HTTP error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Returns `true` if the provider signalled a quota problem.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status == 429,
            _ => false,
        }
    }

    /// Returns `true` if this error is potentially transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            _ => false,
        }
    }
}

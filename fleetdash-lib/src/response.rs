//! Response wrapper with cache status

use chrono::DateTime;
use chrono::Utc;

/// A value returned by the fetch orchestrator, tagged with where it came from.
///
/// A [`CacheStatus::Stale`] response is a degraded success: the upstream
/// call failed and the last payload cached for the key was served at
/// whatever age it had.
///
/// # Example
///
/// ```ignore
/// let response = fleet.vehicles(false).await?;
///
/// if let Some(age) = response.stale_age() {
///     println!("showing data from {} minutes ago", age.num_minutes());
/// }
///
/// let vehicles = response.into_inner();
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    data: T,
    /// Information about which tier produced this response.
    pub cache: CacheStatus,
}

impl<T> Response<T> {
    /// Creates a new response with the given status.
    pub fn new(data: T, cache: CacheStatus) -> Self {
        Self { data, cache }
    }

    /// Returns `true` if the payload came from the memory or durable tier
    /// within its TTL.
    pub fn is_cached(&self) -> bool {
        matches!(
            self.cache,
            CacheStatus::Memory { .. } | CacheStatus::Durable { .. }
        )
    }

    /// Returns `true` if the payload was fetched live from upstream.
    pub fn is_live(&self) -> bool {
        matches!(self.cache, CacheStatus::Live { .. })
    }

    /// Returns `true` if this is a stale fallback.
    pub fn is_degraded(&self) -> bool {
        matches!(self.cache, CacheStatus::Stale { .. })
    }

    /// Returns when the payload was written.
    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cache.cached_at()
    }

    /// Returns the payload's age if this is a stale fallback.
    pub fn stale_age(&self) -> Option<chrono::Duration> {
        match self.cache {
            CacheStatus::Stale { cached_at } => Some(Utc::now() - cached_at),
            _ => None,
        }
    }

    /// Returns a reference to the inner data.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Consumes the response and returns the inner data.
    pub fn into_inner(self) -> T {
        self.data
    }

    /// Maps the inner data using the provided function.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Response<U> {
        Response {
            data: f(self.data),
            cache: self.cache,
        }
    }
}

/// Which step of the orchestrator produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Fresh hit in the memory tier.
    Memory {
        cached_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    /// Fresh row in the durable tier, now copied into memory.
    Durable {
        cached_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    /// Fetched live from upstream and written to both tiers.
    Live {
        cached_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    /// Upstream failed; served from the last cached payload at any age.
    Stale {
        /// When the stale payload was originally written.
        cached_at: DateTime<Utc>,
    },
}

impl CacheStatus {
    /// Returns when the payload was written.
    pub fn cached_at(&self) -> DateTime<Utc> {
        match *self {
            Self::Memory { cached_at, .. }
            | Self::Durable { cached_at, .. }
            | Self::Live { cached_at, .. }
            | Self::Stale { cached_at } => cached_at,
        }
    }

    /// Returns when the payload stops being fresh, unless stale already.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match *self {
            Self::Memory { expires_at, .. }
            | Self::Durable { expires_at, .. }
            | Self::Live { expires_at, .. } => Some(expires_at),
            Self::Stale { .. } => None,
        }
    }

    /// Returns `true` if upstream was not called.
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Memory { .. } | Self::Durable { .. })
    }

    /// Returns `true` if this is a stale fallback.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

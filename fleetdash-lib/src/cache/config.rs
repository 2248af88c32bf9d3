//! Cache configuration

use std::time::Duration;

use serde::Deserialize;

use super::Category;
use super::classify;

/// Per-category freshness budgets, in seconds.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use fleetdash_lib::cache::{Category, TtlTable};
///
/// let table = TtlTable::default().with_ttl(Category::Zones, Duration::from_secs(600));
/// assert_eq!(table.ttl(Category::Zones), Duration::from_secs(600));
/// assert_eq!(table.ttl_for_key("api_zones"), Duration::from_secs(600));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TtlTable {
    pub vehicles: u64,
    pub locations: u64,
    pub trips: u64,
    pub zones: u64,
    pub faults: u64,
    pub status: u64,
    pub report: u64,
    pub exceptions: u64,
    /// Used for keys no classifier rule recognizes.
    pub default: u64,
}

impl Default for TtlTable {
    fn default() -> Self {
        Self {
            vehicles: 60,
            locations: 30,
            trips: 300,
            zones: 300,
            faults: 120,
            status: 60,
            report: 300,
            exceptions: 300,
            default: 60,
        }
    }
}

impl TtlTable {
    /// Returns the TTL in seconds for a category.
    pub fn seconds(&self, category: Category) -> u64 {
        match category {
            Category::Vehicles => self.vehicles,
            Category::Locations => self.locations,
            Category::Trips => self.trips,
            Category::Zones => self.zones,
            Category::Faults => self.faults,
            Category::Status => self.status,
            Category::Report => self.report,
            Category::Exceptions => self.exceptions,
            Category::Default => self.default,
        }
    }

    /// Returns the TTL for a category.
    pub fn ttl(&self, category: Category) -> Duration {
        Duration::from_secs(self.seconds(category))
    }

    /// Classifies `key` and returns its TTL.
    pub fn ttl_for_key(&self, key: &str) -> Duration {
        self.ttl(classify(key))
    }

    /// Sets the TTL of one category.
    pub fn with_ttl(mut self, category: Category, ttl: Duration) -> Self {
        let seconds = ttl.as_secs();
        match category {
            Category::Vehicles => self.vehicles = seconds,
            Category::Locations => self.locations = seconds,
            Category::Trips => self.trips = seconds,
            Category::Zones => self.zones = seconds,
            Category::Faults => self.faults = seconds,
            Category::Status => self.status = seconds,
            Category::Report => self.report = seconds,
            Category::Exceptions => self.exceptions = seconds,
            Category::Default => self.default = seconds,
        }
        self
    }
}

/// Configuration for the fetch orchestrator and its callers.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use fleetdash_lib::cache::{CacheConfig, Category};
///
/// let config = CacheConfig::default()
///     .with_ttl(Category::Trips, Duration::from_secs(120))
///     .with_sample_size(8)
///     .with_coalesce_fetches(true);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL per key category.
    pub ttl: TtlTable,

    /// Number of entities fetched by fleet-wide aggregates.
    ///
    /// Default: 5
    pub sample_size: usize,

    /// Make concurrent misses for the same key share one upstream call.
    ///
    /// Default: false
    pub coalesce_fetches: bool,

    /// Service name reported to call telemetry.
    ///
    /// Default: "fleet"
    pub service: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: TtlTable::default(),
            sample_size: 5,
            coalesce_fetches: false,
            service: "fleet".to_string(),
        }
    }
}

impl CacheConfig {
    /// Creates a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole TTL table.
    pub fn with_ttl_table(mut self, table: TtlTable) -> Self {
        self.ttl = table;
        self
    }

    /// Sets the TTL of one category.
    pub fn with_ttl(mut self, category: Category, ttl: Duration) -> Self {
        self.ttl = self.ttl.with_ttl(category, ttl);
        self
    }

    /// Sets the fan-out sample size.
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size;
        self
    }

    /// Enables or disables per-key fetch coalescing.
    pub fn with_coalesce_fetches(mut self, enabled: bool) -> Self {
        self.coalesce_fetches = enabled;
        self
    }

    /// Sets the service name reported to telemetry.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Returns the TTL for a key.
    pub fn ttl_for_key(&self, key: &str) -> Duration {
        self.ttl.ttl_for_key(key)
    }
}

//! Upstream telemetry provider interface
//!
//! The cache layer never talks to the telemetry service itself. Callers
//! hand [`crate::fleet::FleetData`] an implementation of [`FleetProvider`]
//! whose methods report failures as [`UpstreamError`] values.

mod model;

pub use model::*;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::UpstreamError;
use crate::keys::CacheKey;

/// Trip history query for one vehicle.
///
/// `from` and `to` are passed through to the provider as given; missing
/// bounds mean "provider default".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripQuery {
    pub device_id: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl TripQuery {
    /// Creates an unbounded query for `device_id`.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            from: None,
            to: None,
        }
    }

    /// Sets the date range.
    pub fn between(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self.to = Some(to.into());
        self
    }

    /// Cache key of the trip list for this query.
    pub fn trips_key(&self) -> CacheKey {
        CacheKey::trips(&self.device_id, self.from.as_deref(), self.to.as_deref())
    }

    /// Cache key of the route replay for this query.
    pub fn replay_key(&self) -> CacheKey {
        CacheKey::replay(&self.device_id, self.from.as_deref(), self.to.as_deref())
    }
}

/// The slow, quota-limited telemetry service.
///
/// Payloads the cache layer does not inspect are plain JSON values.
#[async_trait]
pub trait FleetProvider: Send + Sync {
    /// Lists every vehicle in the fleet.
    async fn vehicles(&self) -> Result<Vec<Vehicle>, UpstreamError>;

    /// Returns the latest position of every vehicle.
    async fn locations(&self) -> Result<Value, UpstreamError>;

    /// Returns completed trips for one vehicle.
    async fn trips(&self, query: &TripQuery) -> Result<Vec<Trip>, UpstreamError>;

    /// Returns the GPS trail for one vehicle.
    async fn replay(&self, query: &TripQuery) -> Result<Value, UpstreamError>;

    /// Lists geofence zones.
    async fn zones(&self) -> Result<Value, UpstreamError>;

    /// Lists active faults, optionally for one device.
    async fn faults(&self, device_id: Option<&str>) -> Result<Value, UpstreamError>;

    /// Lists rule-violation events in a date range.
    async fn exceptions(&self, from: Option<&str>, to: Option<&str>) -> Result<Value, UpstreamError>;

    /// Reports connectivity and account summary.
    async fn status(&self) -> Result<Value, UpstreamError>;

    /// Creates a geofence zone, returning the provider's record of it.
    async fn create_zone(&self, zone: &Value) -> Result<Value, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_keys() {
        let query = TripQuery::new("b1");
        assert_eq!(query.trips_key().as_str(), "trips_b1_None_None");

        let query = query.between("2026-01-01", "2026-01-08");
        assert_eq!(query.replay_key().as_str(), "replay_b1_2026-01-01_2026-01-08");
    }
}

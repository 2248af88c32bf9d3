//! Cache key builders
//!
//! Every dataset gets a pure constructor so the key for a logical query is
//! reconstructible by any caller. Keys follow
//! `{dataset}_{param1}_{param2}_...`:
//!
//! - a missing optional param (or an empty one) is written as [`PLACEHOLDER`]
//! - `%` and `_` inside a param are percent-escaped, so `_` only ever
//!   separates segments
//! - a param whose literal value is `None` is escaped to `%4Eone` so it
//!   cannot be mistaken for a missing one

use std::fmt;

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

/// Token written for a missing optional param.
pub const PLACEHOLDER: &str = "None";

/// A deterministic cache key.
///
/// # Example
///
/// ```
/// use fleetdash_lib::keys::CacheKey;
///
/// let key = CacheKey::trips("b12", None, None);
/// assert_eq!(key.as_str(), "trips_b12_None_None");
///
/// let key = CacheKey::faults(Some("b_7"));
/// assert_eq!(key.as_str(), "api_faults_b%5F7");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds a key from a dataset prefix and its params.
    pub fn build<'a>(dataset: &str, params: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        let mut key = dataset.to_string();
        for param in params {
            key.push('_');
            key.push_str(&normalize(param));
        }
        Self(key)
    }

    /// Builds the prefix shared by every key of `dataset` starting with
    /// `params`.
    pub fn prefix<'a>(dataset: &str, params: impl IntoIterator<Item = Option<&'a str>>) -> String {
        let mut prefix = Self::build(dataset, params).0;
        prefix.push('_');
        prefix
    }

    /// Wraps an already-built key verbatim.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Fleet vehicle inventory, shared by every page.
    pub fn vehicles() -> Self {
        Self::raw("vehicles")
    }

    /// Vehicle list as served to the map view.
    pub fn api_vehicles() -> Self {
        Self::raw("api_vehicles")
    }

    /// Latest position of every vehicle.
    pub fn locations() -> Self {
        Self::raw("locations")
    }

    /// Trip history for one vehicle and date range.
    pub fn trips(device_id: &str, from: Option<&str>, to: Option<&str>) -> Self {
        Self::build("trips", [Some(device_id), from, to])
    }

    /// Route replay for one vehicle and date range.
    pub fn replay(device_id: &str, from: Option<&str>, to: Option<&str>) -> Self {
        Self::build("replay", [Some(device_id), from, to])
    }

    /// All geofence zones.
    pub fn zones() -> Self {
        Self::raw("api_zones")
    }

    /// Active faults, optionally filtered to one device.
    pub fn faults(device_id: Option<&str>) -> Self {
        Self::build("api_faults", [device_id])
    }

    /// Exception (rule violation) events for a date range.
    pub fn exceptions(from: Option<&str>, to: Option<&str>) -> Self {
        Self::build("api_exceptions", [from, to])
    }

    /// Connection status and fleet summary.
    pub fn status() -> Self {
        Self::raw("api_status")
    }

    /// Fleet-wide KPI rollup.
    pub fn fleet_kpis() -> Self {
        Self::raw("api_fleet_kpis")
    }

    /// Activity heatmap.
    pub fn heatmap() -> Self {
        Self::raw("api_heatmap")
    }

    /// Generated fleet report.
    pub fn report() -> Self {
        Self::raw("report_html")
    }

    /// A named read operation with arbitrary arguments.
    ///
    /// The arguments are hashed in canonical JSON form (object keys sorted),
    /// so argument order does not change the key.
    pub fn tool<A: Serialize>(name: &str, args: &A) -> Result<Self, serde_json::Error> {
        // Value maps are ordered, which canonicalizes key order
        let canonical = serde_json::to_vec(&serde_json::to_value(args)?)?;
        let digest = Sha256::digest(&canonical);
        Ok(Self(format!("{}{:x}", Self::tool_prefix(name), digest)))
    }

    /// Prefix shared by every key of [`CacheKey::tool`] for `name`.
    pub fn tool_prefix(name: &str) -> String {
        Self::prefix("tool", [Some(name)])
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

fn normalize(param: Option<&str>) -> String {
    let Some(value) = param.map(str::trim).filter(|v| !v.is_empty()) else {
        return PLACEHOLDER.to_string();
    };
    if value == PLACEHOLDER {
        return "%4Eone".to_string();
    }
    // urlencoding leaves `_` alone
    urlencoding::encode(value).replace('_', "%5F")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_keys() {
        assert_eq!(CacheKey::vehicles().as_str(), "vehicles");
        assert_eq!(CacheKey::zones().as_str(), "api_zones");
        assert_eq!(CacheKey::faults(None).as_str(), "api_faults_None");
        assert_eq!(CacheKey::fleet_kpis().as_str(), "api_fleet_kpis");
        assert_eq!(
            CacheKey::exceptions(Some("2026-01-01"), None).as_str(),
            "api_exceptions_2026-01-01_None"
        );
    }

    #[test]
    fn test_same_query_same_key() {
        let a = CacheKey::trips("b1", Some("2026-01-01"), Some("2026-01-02"));
        let b = CacheKey::trips("b1", Some("2026-01-01"), Some("2026-01-02"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_and_blank_params_are_missing() {
        assert_eq!(CacheKey::trips("b1", Some(""), Some("  ")), CacheKey::trips("b1", None, None));
    }

    #[test]
    fn test_separator_in_param_does_not_collide() {
        let a = CacheKey::trips("b1_2026", None, None);
        let b = CacheKey::trips("b1", Some("2026"), None);
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "trips_b1%5F2026_None_None");
    }

    #[test]
    fn test_literal_placeholder_does_not_collide() {
        assert_ne!(CacheKey::faults(Some("None")), CacheKey::faults(None));
        assert_ne!(CacheKey::faults(Some("%4Eone")), CacheKey::faults(Some("None")));
    }

    #[test]
    fn test_trips_and_replay_differ() {
        assert_ne!(CacheKey::trips("b1", None, None), CacheKey::replay("b1", None, None));
    }

    #[test]
    fn test_tool_key_ignores_arg_order() {
        let a = CacheKey::tool("get_faults", &serde_json::json!({"device": "b1", "limit": 20})).unwrap();
        let b = CacheKey::tool("get_faults", &serde_json::json!({"limit": 20, "device": "b1"})).unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("tool_get%5Ffaults_"));
        assert!(a.as_str().starts_with(&CacheKey::tool_prefix("get_faults")));
    }

    #[test]
    fn test_prefix_matches_keys() {
        let prefix = CacheKey::prefix("replay", [Some("b_1")]);
        assert_eq!(prefix, "replay_b%5F1_");
        assert!(CacheKey::replay("b_1", Some("2026-01-01"), None).as_str().starts_with(&prefix));
        assert!(!CacheKey::replay("b_10", None, None).as_str().starts_with(&prefix));
    }

    #[test]
    fn test_tool_key_depends_on_args() {
        let a = CacheKey::tool("get_faults", &serde_json::json!({"device": "b1"})).unwrap();
        let b = CacheKey::tool("get_faults", &serde_json::json!({"device": "b2"})).unwrap();
        assert_ne!(a, b);
    }
}

//! Key classification into TTL categories

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Freshness category of a cache key.
///
/// Each category maps to a TTL in [`super::TtlTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Vehicles,
    Locations,
    Trips,
    Zones,
    Faults,
    Status,
    Report,
    Exceptions,
    /// Keys no rule recognizes.
    Default,
}

impl Category {
    /// All categories, in TTL-table order.
    pub const ALL: [Category; 9] = [
        Category::Vehicles,
        Category::Locations,
        Category::Trips,
        Category::Zones,
        Category::Faults,
        Category::Status,
        Category::Report,
        Category::Exceptions,
        Category::Default,
    ];

    /// Returns the lowercase name used in config files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vehicles => "vehicles",
            Self::Locations => "locations",
            Self::Trips => "trips",
            Self::Zones => "zones",
            Self::Faults => "faults",
            Self::Status => "status",
            Self::Report => "report",
            Self::Exceptions => "exceptions",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Rule {
    Prefix(&'static str),
    Contains(&'static str),
}

impl Rule {
    fn matches(&self, key: &str) -> bool {
        match self {
            Self::Prefix(p) => key.starts_with(p),
            Self::Contains(s) => key.contains(s),
        }
    }
}

// First match wins.
const RULES: &[(Rule, Category)] = &[
    (Rule::Prefix("trip"), Category::Trips),
    (Rule::Prefix("replay"), Category::Trips),
    (Rule::Contains("vehicle"), Category::Vehicles),
    (Rule::Contains("location"), Category::Locations),
    (Rule::Contains("exception"), Category::Exceptions),
    (Rule::Contains("fault"), Category::Faults),
    (Rule::Contains("zone"), Category::Zones),
    (Rule::Contains("status"), Category::Status),
    (Rule::Contains("report"), Category::Report),
    (Rule::Contains("kpi"), Category::Trips),
    (Rule::Contains("heatmap"), Category::Trips),
];

/// Maps a cache key to its TTL category.
///
/// Total and pure: every string, including the empty string, gets a
/// category. Matching is case-sensitive because keys are built by
/// [`crate::keys::CacheKey`] in lowercase.
///
/// # Example
///
/// ```
/// use fleetdash_lib::cache::{classify, Category};
///
/// assert_eq!(classify("trips_b12_None_None"), Category::Trips);
/// assert_eq!(classify("api_zones"), Category::Zones);
/// assert_eq!(classify("something_else"), Category::Default);
/// ```
pub fn classify(key: &str) -> Category {
    RULES
        .iter()
        .find(|(rule, _)| rule.matches(key))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Default)
}

//! Upstream payload types
//!
//! Only the fields the cache layer reads are typed; everything else rides
//! along in `extra` so cached payloads keep the upstream shape.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// A fleet vehicle (telematics device).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Stable device id, also the sampling sort key.
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Vehicle {
    /// Creates a vehicle with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            extra: Map::new(),
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// One completed trip.
///
/// Durations are held as seconds. Upstream sends them either as numbers or
/// as `H:MM:SS` strings; both are accepted, and they are written back as
/// numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    /// Distance in metres.
    #[serde(default, deserialize_with = "number_or_zero")]
    pub distance: f64,

    #[serde(default, deserialize_with = "duration_seconds")]
    pub driving_duration: f64,

    #[serde(default, deserialize_with = "duration_seconds")]
    pub idling_duration: f64,

    /// Peak speed in km/h.
    #[serde(default, deserialize_with = "number_or_zero")]
    pub maximum_speed: f64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trip {
    /// Creates a trip from its measured values.
    pub fn new(distance_m: f64, driving_s: f64, idling_s: f64, max_speed_kmh: f64) -> Self {
        Self {
            distance: distance_m,
            driving_duration: driving_s,
            idling_duration: idling_s,
            maximum_speed: max_speed_kmh,
            extra: Map::new(),
        }
    }
}

/// Parses a duration into seconds.
///
/// Accepts `H:MM:SS` with an optional fractional tail (ignored) or a plain
/// number of seconds. Anything else, including `None`, is zero.
///
/// # Example
///
/// ```
/// use fleetdash_lib::provider::parse_duration;
///
/// assert_eq!(parse_duration("1:23:45"), 5025.0);
/// assert_eq!(parse_duration("0:05:30.250"), 330.0);
/// assert_eq!(parse_duration("42.5"), 42.5);
/// assert_eq!(parse_duration("soon"), 0.0);
/// ```
pub fn parse_duration(value: &str) -> f64 {
    let value = value.trim();
    if let Some(seconds) = parse_clock(value) {
        return seconds;
    }
    match value.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() => seconds,
        _ => 0.0,
    }
}

fn parse_clock(value: &str) -> Option<f64> {
    let clock = value.split_once('.').map_or(value, |(clock, _)| clock);
    let mut parts = clock.split(':');
    let (hours, minutes, seconds) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || minutes.len() != 2 || seconds.len() != 2 {
        return None;
    }
    if ![hours, minutes, seconds]
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let hours: f64 = hours.parse().ok()?;
    let minutes: f64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn duration_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_duration(&s),
        _ => 0.0,
    })
}

fn number_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    })
}

//! Call telemetry sinks
//!
//! The orchestrator reports every lookup outcome through [`CallTelemetry`].
//! Sinks are best-effort: they cannot fail a request.

mod sqlite;

pub use sqlite::*;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;

/// Outcome of one orchestrated lookup, as recorded by telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Live upstream call succeeded.
    Success,
    /// Live upstream call failed.
    Error,
    /// Served from the memory tier.
    Cached,
    /// Served from a fresh durable row.
    DbWarm,
    /// Served from a stale durable row after an upstream failure.
    StaleFallback,
}

impl Outcome {
    /// Returns the name stored in the call log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Cached => "cached",
            Self::DbWarm => "db_warm",
            Self::StaleFallback => "stale_fallback",
        }
    }

    /// Returns `true` if no upstream call was made for this outcome.
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached | Self::DbWarm)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown outcome name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown call outcome: {0}")]
pub struct UnknownOutcome(pub String);

impl FromStr for Outcome {
    type Err = UnknownOutcome;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "cached" => Ok(Self::Cached),
            "db_warm" => Ok(Self::DbWarm),
            "stale_fallback" => Ok(Self::StaleFallback),
            other => Err(UnknownOutcome(other.to_string())),
        }
    }
}

/// One telemetry event.
#[derive(Debug, Clone, PartialEq)]
pub struct CallEvent {
    pub service: String,
    pub operation: String,
    pub outcome: Outcome,
    pub latency: Duration,
    pub error: Option<String>,
}

impl CallEvent {
    /// Creates an event without an error message.
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        outcome: Outcome,
        latency: Duration,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            outcome,
            latency,
            error: None,
        }
    }

    /// Attaches an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Trait for telemetry sinks.
///
/// Implementations must not block for long and must swallow their own
/// failures (logging them), since they run inline with requests.
#[async_trait]
pub trait CallTelemetry: Send + Sync {
    /// Records one event.
    async fn record(&self, event: CallEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

#[async_trait]
impl CallTelemetry for NoopTelemetry {
    async fn record(&self, _event: CallEvent) {}
}

/// Writes every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

#[async_trait]
impl CallTelemetry for LogTelemetry {
    async fn record(&self, event: CallEvent) {
        match &event.error {
            Some(error) => log::warn!(
                "{}.{} {} in {}ms: {}",
                event.service,
                event.operation,
                event.outcome,
                event.latency.as_millis(),
                error
            ),
            None => log::debug!(
                "{}.{} {} in {}ms",
                event.service,
                event.operation,
                event.outcome,
                event.latency.as_millis()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_names_round_trip() {
        for outcome in [
            Outcome::Success,
            Outcome::Error,
            Outcome::Cached,
            Outcome::DbWarm,
            Outcome::StaleFallback,
        ] {
            assert_eq!(outcome.as_str().parse::<Outcome>(), Ok(outcome));
        }
        assert!("hit".parse::<Outcome>().is_err());
    }

    #[test]
    fn test_cached_outcomes() {
        assert!(Outcome::Cached.is_cached());
        assert!(Outcome::DbWarm.is_cached());
        assert!(!Outcome::StaleFallback.is_cached());
    }
}

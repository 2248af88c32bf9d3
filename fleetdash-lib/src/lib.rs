//! Fleet telemetry cache library
//!
//! Keeps a fleet dashboard answering while its telemetry provider is slow,
//! rate-limited or down. Every upstream call goes through a two-tier cache
//! (in-process memory over a SQLite durable store), and a failed call is
//! answered from whatever was cached last, at any age.

pub mod cache;
pub mod error;
pub mod fetch;
pub mod fleet;
pub mod keys;
pub mod provider;
pub mod rate_limit;
pub mod response;
pub mod sampling;
pub mod telemetry;
pub mod warmup;

pub use error::Error;
pub use fleet::FleetData;
pub use keys::CacheKey;
pub use response::CacheStatus;
pub use response::Response;

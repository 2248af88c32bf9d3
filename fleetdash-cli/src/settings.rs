//! TOML settings file.
//!
//! ```toml
//! store_path = "/var/lib/fleetdash/fleet_cache.db"
//!
//! [cache]
//! sample_size = 5
//!
//! [cache.ttl]
//! zones = 600
//!
//! [warmup]
//! hot_keys = ["vehicles", "api_zones"]
//! families = ["trips_"]
//!
//! [logging]
//! keep = 10
//! ```

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;

use fleetdash_lib::cache::CacheConfig;
use fleetdash_lib::warmup::WarmupPlan;

use crate::paths;

/// Everything the CLI reads from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheConfig,
    pub warmup: WarmupPlan,
    /// Durable cache database. Defaults to the platform data dir.
    pub store_path: Option<PathBuf>,
    /// Call log database. Defaults to the platform data dir.
    pub call_log_path: Option<PathBuf>,
    pub logging: LogSettings,
}

/// Log file rotation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Archived log files kept besides `latest.log`.
    pub keep: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { keep: 10 }
    }
}

impl Settings {
    /// Loads settings from `path`, or from the platform config file if it
    /// exists. Missing files give the defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match paths::config_file() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let settings = Self::parse(&text).with_context(|| format!("parsing {}", path.display()))?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Resolves the durable cache database path.
    pub fn store_path(&self) -> Result<PathBuf> {
        self.store_path
            .clone()
            .or_else(paths::store_db)
            .context("no store path configured and no home directory")
    }

    /// Resolves the call log database path.
    pub fn call_log_path(&self) -> Result<PathBuf> {
        self.call_log_path
            .clone()
            .or_else(paths::call_log_db)
            .context("no call log path configured and no home directory")
    }
}

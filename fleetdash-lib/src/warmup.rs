//! Startup warmup
//!
//! Copies a fixed set of hot keys from the durable tier into memory, so the
//! first requests after a restart do not each pay a durable read. Rows are
//! loaded at any age: an old payload in memory beats a cold start, and the
//! memory TTL bounds how long it is served before a refetch.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::DurableStore;
use crate::cache::MemoryTier;
use crate::cache::TtlTable;
use crate::fetch::FetchOrchestrator;
use crate::keys::CacheKey;

/// Which keys to warm.
///
/// # Example
///
/// ```
/// use fleetdash_lib::warmup::WarmupPlan;
///
/// let plan = WarmupPlan::new()
///     .hot_key("api_zones")
///     .family("trips_")
///     .max_keys_per_family(20);
/// assert_eq!(plan.hot_keys, ["api_zones"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WarmupPlan {
    /// Exact keys to load.
    pub hot_keys: Vec<String>,

    /// Key prefixes whose rows are loaded in bulk.
    pub families: Vec<String>,

    /// Cap on keys loaded per family, in ascending key order.
    ///
    /// Default: 50
    pub max_keys_per_family: usize,
}

impl Default for WarmupPlan {
    /// The dashboard's landing datasets plus every cached trip list.
    fn default() -> Self {
        Self {
            hot_keys: [
                CacheKey::vehicles(),
                CacheKey::api_vehicles(),
                CacheKey::locations(),
                CacheKey::zones(),
                CacheKey::faults(None),
                CacheKey::status(),
                CacheKey::fleet_kpis(),
            ]
            .into_iter()
            .map(CacheKey::into_string)
            .collect(),
            families: vec!["trips_".to_string()],
            max_keys_per_family: 50,
        }
    }
}

impl WarmupPlan {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self {
            hot_keys: Vec::new(),
            families: Vec::new(),
            max_keys_per_family: 50,
        }
    }

    /// Adds an exact key.
    pub fn hot_key(mut self, key: impl Into<String>) -> Self {
        self.hot_keys.push(key.into());
        self
    }

    /// Adds a key family.
    pub fn family(mut self, prefix: impl Into<String>) -> Self {
        self.families.push(prefix.into());
        self
    }

    /// Sets the per-family cap.
    pub fn max_keys_per_family(mut self, max: usize) -> Self {
        self.max_keys_per_family = max;
        self
    }
}

/// What a warmup run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupReport {
    /// Keys copied into memory.
    pub loaded: usize,
    /// Hot keys with no durable row.
    pub missing: usize,
    /// Keys or families whose durable read failed.
    pub failed: usize,
}

/// Runs a [`WarmupPlan`] against a pair of tiers.
pub struct Warmup {
    memory: Arc<MemoryTier>,
    durable: Arc<dyn DurableStore>,
    ttl: TtlTable,
}

impl Warmup {
    /// Creates a warmup over the given tiers.
    pub fn new(memory: Arc<MemoryTier>, durable: Arc<dyn DurableStore>, ttl: TtlTable) -> Self {
        Self {
            memory,
            durable,
            ttl,
        }
    }

    /// Creates a warmup sharing an orchestrator's tiers and TTLs.
    pub fn for_orchestrator(orchestrator: &FetchOrchestrator) -> Self {
        Self::new(
            Arc::clone(orchestrator.memory()),
            Arc::clone(orchestrator.durable()),
            orchestrator.config().ttl.clone(),
        )
    }

    /// Loads every planned key. Never fails; read errors are counted and
    /// logged.
    ///
    /// Safe to run repeatedly: each load overwrites the key's memory entry.
    pub async fn run(&self, plan: &WarmupPlan) -> WarmupReport {
        let mut report = WarmupReport::default();

        for key in &plan.hot_keys {
            self.load(key, &mut report, true).await;
        }

        for prefix in &plan.families {
            let keys = match self.durable.list_keys_with_prefix(prefix).await {
                Ok(keys) => keys,
                Err(e) => {
                    log::warn!("warmup could not list family {}: {}", prefix, e);
                    report.failed += 1;
                    continue;
                }
            };
            if keys.len() > plan.max_keys_per_family {
                log::debug!(
                    "warmup family {} has {} keys, loading the first {}",
                    prefix,
                    keys.len(),
                    plan.max_keys_per_family
                );
            }
            for key in keys.iter().take(plan.max_keys_per_family) {
                self.load(key, &mut report, false).await;
            }
        }

        log::info!(
            "warmup loaded {} keys ({} missing, {} failed)",
            report.loaded,
            report.missing,
            report.failed
        );
        report
    }

    async fn load(&self, key: &str, report: &mut WarmupReport, count_missing: bool) {
        match self.durable.get(key).await {
            Ok(Some(entry)) => {
                self.memory.set(key, entry.payload, self.ttl_for(key));
                report.loaded += 1;
            }
            // A family key can vanish between listing and loading
            Ok(None) => {
                if count_missing {
                    report.missing += 1;
                }
            }
            Err(e) => {
                log::warn!("warmup could not read {}: {}", key, e);
                report.failed += 1;
            }
        }
    }

    fn ttl_for(&self, key: &str) -> Duration {
        self.ttl.ttl_for_key(key)
    }
}

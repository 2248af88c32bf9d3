//! Fetch orchestration
//!
//! Every upstream call goes through [`FetchOrchestrator::fetch`], which
//! tries, in order:
//!
//! 1. on force-refresh, drop the key from both tiers (remembering the
//!    dropped payload, which is put back if the refetch fails)
//! 2. the memory tier
//! 3. the durable tier in fresh mode, copying a hit back into memory
//! 4. the upstream call, writing a success through both tiers
//!
//! When step 4 fails, any previously cached payload for the key is served
//! as a degraded result, whatever its age. Only when nothing was ever
//! cached does the failure reach the caller.

mod flight;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::CacheConfig;
use crate::cache::CacheEntry;
use crate::cache::Category;
use crate::cache::DurableStore;
use crate::cache::MemoryTier;
use crate::error::Error;
use crate::error::UpstreamError;
use crate::keys::CacheKey;
use crate::rate_limit::CallBudget;
use crate::response::CacheStatus;
use crate::response::Response;
use crate::telemetry::CallEvent;
use crate::telemetry::CallTelemetry;
use crate::telemetry::NoopTelemetry;
use crate::telemetry::Outcome;

use flight::InFlight;

// =============================================================================
// FetchRequest
// =============================================================================

/// One orchestrated lookup.
///
/// # Example
///
/// ```
/// use fleetdash_lib::fetch::FetchRequest;
/// use fleetdash_lib::keys::CacheKey;
///
/// let request = FetchRequest::new(CacheKey::zones(), "get_zones").force_refresh(true);
/// assert_eq!(request.key().as_str(), "api_zones");
/// ```
#[derive(Debug, Clone)]
pub struct FetchRequest {
    key: CacheKey,
    operation: String,
    category: Option<Category>,
    force_refresh: bool,
    fallback_prefix: Option<String>,
}

impl FetchRequest {
    /// Creates a request for `key`, served upstream by `operation`.
    pub fn new(key: CacheKey, operation: impl Into<String>) -> Self {
        Self {
            key,
            operation: operation.into(),
            category: None,
            force_refresh: false,
            fallback_prefix: None,
        }
    }

    /// Uses this category's TTL instead of classifying the key.
    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Drops the key from both tiers before looking it up.
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// On upstream failure with no row for the exact key, serve the most
    /// recent row whose key starts with `prefix`.
    pub fn fallback_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.fallback_prefix = Some(prefix.into());
        self
    }

    /// Returns the cache key.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns the upstream operation name.
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

// =============================================================================
// FetchOrchestrator
// =============================================================================

/// Wraps upstream calls with the two cache tiers.
///
/// Cheap to clone; clones share the tiers, telemetry sink, call budget and
/// in-flight table.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use fleetdash_lib::cache::{CacheConfig, MemoryTier, SqliteStore};
/// use fleetdash_lib::fetch::{FetchOrchestrator, FetchRequest};
/// use fleetdash_lib::keys::CacheKey;
///
/// let store = SqliteStore::open("fleet_cache.db").await?;
/// let orchestrator = FetchOrchestrator::new(Arc::new(MemoryTier::new()), Arc::new(store))
///     .with_config(CacheConfig::default());
///
/// let zones = orchestrator
///     .fetch(FetchRequest::new(CacheKey::zones(), "get_zones"), || provider.zones())
///     .await?;
/// ```
#[derive(Clone)]
pub struct FetchOrchestrator {
    memory: Arc<MemoryTier>,
    durable: Arc<dyn DurableStore>,
    telemetry: Arc<dyn CallTelemetry>,
    config: Arc<CacheConfig>,
    budget: Option<CallBudget>,
    flights: InFlight,
}

impl FetchOrchestrator {
    /// Creates an orchestrator over the given tiers with default config
    /// and no telemetry.
    pub fn new(memory: Arc<MemoryTier>, durable: Arc<dyn DurableStore>) -> Self {
        Self {
            memory,
            durable,
            telemetry: Arc::new(NoopTelemetry),
            config: Arc::new(CacheConfig::default()),
            budget: None,
            flights: InFlight::new(),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Sets the telemetry sink.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn CallTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Caps live upstream calls. Calls over budget take the failure path.
    pub fn with_budget(mut self, budget: CallBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Returns the memory tier.
    pub fn memory(&self) -> &Arc<MemoryTier> {
        &self.memory
    }

    /// Returns the durable tier.
    pub fn durable(&self) -> &Arc<dyn DurableStore> {
        &self.durable
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Looks up `request`, calling `fetch` only when neither tier has a
    /// fresh payload.
    ///
    /// Returns [`Error::Unavailable`] only if `fetch` fails and no payload
    /// was ever cached for the key (or the fallback prefix).
    pub async fn fetch<T, F, Fut>(&self, request: FetchRequest, fetch: F) -> Result<Response<T>, Error>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        // Kept in hand so a failed refetch can still degrade to it
        let evicted = if request.force_refresh {
            self.evict(request.key.as_str()).await
        } else {
            None
        };

        if let Some(response) = self.from_memory(&request).await {
            return Ok(response);
        }
        if let Some(response) = self.from_durable(&request).await {
            return Ok(response);
        }

        let _flight = if self.config.coalesce_fetches {
            let guard = self.flights.acquire(request.key.as_str()).await;
            // Whoever held the key before us may have filled memory
            if let Some(response) = self.from_memory(&request).await {
                return Ok(response);
            }
            Some(guard)
        } else {
            None
        };

        let started = Instant::now();
        let result = match self.take_budget().await {
            Ok(()) => fetch().await,
            Err(error) => Err(error),
        };
        let latency = started.elapsed();

        match result {
            Ok(data) => {
                let status = self.write_through(&request, &data).await;
                self.record(&request, Outcome::Success, latency, None).await;
                Ok(Response::new(data, status))
            }
            Err(error) => {
                self.record(&request, Outcome::Error, latency, Some(error.to_string()))
                    .await;
                self.from_stale(&request, error, evicted).await
            }
        }
    }

    /// Returns the memory tier's payload for `key`, if fresh.
    ///
    /// Never calls upstream and records no telemetry. Aggregates use this
    /// to reuse data other requests already paid for.
    pub fn cached<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entry = self.memory.get(key.as_str())?;
        serde_json::from_slice(&entry.payload).ok()
    }

    /// Removes `key` from both tiers.
    ///
    /// Called after mutations that make the cached payload wrong.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), Error> {
        self.memory.invalidate(key.as_str());
        self.durable.delete(key.as_str()).await?;
        log::debug!("invalidated {}", key);
        Ok(())
    }

    fn ttl_for(&self, request: &FetchRequest) -> Duration {
        match request.category {
            Some(category) => self.config.ttl.ttl(category),
            None => self.config.ttl_for_key(request.key.as_str()),
        }
    }

    async fn take_budget(&self) -> Result<(), UpstreamError> {
        let Some(budget) = &self.budget else {
            return Ok(());
        };
        budget.try_acquire().await.map_err(|wait| {
            UpstreamError::rate_limited(
                format!(
                    "local budget of {} calls per {:?} exhausted",
                    budget.capacity(),
                    budget.window()
                ),
                Some(wait),
            )
        })
    }

    /// Removes `key` from both tiers, returning what was there.
    async fn evict(&self, key: &str) -> Option<CacheEntry> {
        let previous = match self.durable.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("force refresh could not read durable row for {}: {}", key, e);
                None
            }
        }
        .or_else(|| self.memory.peek(key));

        self.memory.invalidate(key);
        if let Err(e) = self.durable.delete(key).await {
            log::warn!("force refresh could not delete durable row for {}: {}", key, e);
        }
        previous
    }

    async fn from_memory<T: DeserializeOwned>(&self, request: &FetchRequest) -> Option<Response<T>> {
        let entry = self.memory.get(request.key.as_str())?;
        let data = decode(&entry)?;
        log::debug!("memory hit for {}", request.key);
        self.record(request, Outcome::Cached, Duration::ZERO, None).await;
        Some(Response::new(
            data,
            CacheStatus::Memory {
                cached_at: entry.cached_at,
                expires_at: entry.expires_at(),
            },
        ))
    }

    async fn from_durable<T: DeserializeOwned>(&self, request: &FetchRequest) -> Option<Response<T>> {
        let started = Instant::now();
        let entry = match self.durable.get_fresh(request.key.as_str()).await {
            Ok(entry) => entry?,
            Err(e) => {
                log::warn!("durable read failed for {}: {}", request.key, e);
                return None;
            }
        };
        let data = decode(&entry)?;

        let expires_at = entry.expires_at();
        self.memory
            .set(&entry.key, entry.payload, self.ttl_for(request));
        log::debug!("durable hit for {}, copied to memory", request.key);
        self.record(request, Outcome::DbWarm, started.elapsed(), None)
            .await;

        Some(Response::new(
            data,
            CacheStatus::Durable {
                cached_at: entry.cached_at,
                expires_at,
            },
        ))
    }

    async fn from_stale<T: DeserializeOwned>(
        &self,
        request: &FetchRequest,
        error: UpstreamError,
        evicted: Option<CacheEntry>,
    ) -> Result<Response<T>, Error> {
        let key = request.key.as_str();

        // (entry, was evicted by this request's force refresh)
        let mut candidates: Vec<(CacheEntry, bool)> = Vec::with_capacity(4);
        match self.durable.get(key).await {
            Ok(entry) => candidates.extend(entry.map(|e| (e, false))),
            Err(e) => log::warn!("stale read failed for {}: {}", key, e),
        }
        // Memory keeps expired entries; they cover a failed durable write
        candidates.extend(self.memory.peek(key).map(|e| (e, false)));
        candidates.extend(evicted.map(|e| (e, true)));
        if let Some(prefix) = &request.fallback_prefix {
            match self.durable.get_by_prefix(prefix).await {
                Ok(entry) => candidates.extend(entry.map(|e| (e, false))),
                Err(e) => log::warn!("prefix read failed for {}: {}", prefix, e),
            }
        }

        for (entry, evicted) in candidates {
            let Some(data) = decode(&entry) else {
                continue;
            };
            log::warn!(
                "serving stale {} from {} after upstream failure: {}",
                key,
                entry.cached_at,
                error
            );
            let cached_at = entry.cached_at;
            if evicted {
                self.restore(entry).await;
            }
            self.record(request, Outcome::StaleFallback, Duration::ZERO, Some(error.to_string()))
                .await;
            return Ok(Response::new(data, CacheStatus::Stale { cached_at }));
        }

        Err(Error::Unavailable {
            key: key.to_string(),
            operation: request.operation.clone(),
            source: error,
        })
    }

    /// Puts back a payload dropped by a force refresh whose refetch failed,
    /// so later requests in the same outage can still degrade to it.
    ///
    /// The restored entry is always expired: the refresh asked for a new
    /// payload, so the next request retries upstream.
    async fn restore(&self, mut entry: CacheEntry) {
        if entry.is_fresh_at(Utc::now()) {
            entry.ttl_seconds = 0;
        }
        let key = entry.key.clone();
        self.memory.insert(entry.clone());
        if let Err(e) = self.durable.set(entry).await {
            log::warn!("could not restore durable row for {}: {}", key, e);
        }
    }

    async fn write_through<T: Serialize>(&self, request: &FetchRequest, data: &T) -> CacheStatus {
        let ttl = self.ttl_for(request);
        let now = Utc::now();
        let payload = match serde_json::to_vec(data) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("not caching {}: {}", request.key, e);
                return CacheStatus::Live {
                    cached_at: now,
                    expires_at: now,
                };
            }
        };

        let entry = CacheEntry::new(request.key.as_str(), payload, now, ttl.as_secs());
        let expires_at = entry.expires_at();
        self.memory.insert(entry.clone());
        if let Err(e) = self.durable.set(entry).await {
            log::warn!("durable write failed for {}: {}", request.key, e);
        }

        CacheStatus::Live {
            cached_at: now,
            expires_at,
        }
    }

    async fn record(
        &self,
        request: &FetchRequest,
        outcome: Outcome,
        latency: Duration,
        error: Option<String>,
    ) {
        let mut event = CallEvent::new(
            self.config.service.as_str(),
            request.operation.as_str(),
            outcome,
            latency,
        );
        event.error = error;
        self.telemetry.record(event).await;
    }
}

fn decode<T: DeserializeOwned>(entry: &CacheEntry) -> Option<T> {
    match serde_json::from_slice(&entry.payload) {
        Ok(data) => Some(data),
        Err(e) => {
            log::warn!("ignoring undecodable payload for {}: {}", entry.key, e);
            None
        }
    }
}

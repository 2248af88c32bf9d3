//! Cached fleet datasets

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::CacheConfig;
use crate::cache::DurableStore;
use crate::cache::MemoryTier;
use crate::error::Error;
use crate::error::UpstreamError;
use crate::fetch::FetchOrchestrator;
use crate::fetch::FetchRequest;
use crate::keys::CacheKey;
use crate::provider::FleetProvider;
use crate::provider::Trip;
use crate::provider::TripQuery;
use crate::provider::Vehicle;
use crate::rate_limit::CallBudget;
use crate::response::Response;
use crate::sampling::FleetKpis;
use crate::sampling::KpiRollup;
use crate::sampling::SamplePolicy;
use crate::telemetry::CallTelemetry;
use crate::warmup::Warmup;

/// Every dataset the dashboard shows, each behind the fetch orchestrator.
///
/// All reads take a `force_refresh` flag that drops the cached payload
/// before looking it up.
///
/// Cheap to clone; clones share the provider and both cache tiers.
///
/// # Example
///
/// ```ignore
/// use fleetdash_lib::cache::SqliteStore;
/// use fleetdash_lib::fleet::FleetData;
///
/// let fleet = FleetData::builder()
///     .provider(my_provider)
///     .store(SqliteStore::open("fleet_cache.db").await?)
///     .build();
///
/// let vehicles = fleet.vehicles(false).await?;
/// if vehicles.is_degraded() {
///     log::warn!("provider down, showing cached vehicles");
/// }
/// ```
#[derive(Clone)]
pub struct FleetData {
    inner: Arc<FleetDataInner>,
}

struct FleetDataInner {
    provider: Arc<dyn FleetProvider>,
    orchestrator: FetchOrchestrator,
    sampling: SamplePolicy,
}

impl FleetData {
    /// Creates a new builder.
    pub fn builder() -> FleetDataBuilder<Missing, Missing> {
        FleetDataBuilder::new()
    }

    /// Returns the orchestrator every read goes through.
    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.inner.orchestrator
    }

    /// Returns a warmup over this facade's tiers.
    pub fn warmup(&self) -> Warmup {
        Warmup::for_orchestrator(&self.inner.orchestrator)
    }

    /// Lists every vehicle.
    pub async fn vehicles(&self, force_refresh: bool) -> Result<Response<Vec<Vehicle>>, Error> {
        let request = FetchRequest::new(CacheKey::vehicles(), "get_vehicles").force_refresh(force_refresh);
        self.inner
            .orchestrator
            .fetch(request, || self.inner.provider.vehicles())
            .await
    }

    /// Returns the latest position of every vehicle.
    pub async fn locations(&self, force_refresh: bool) -> Result<Response<Value>, Error> {
        let request = FetchRequest::new(CacheKey::locations(), "get_locations").force_refresh(force_refresh);
        self.inner
            .orchestrator
            .fetch(request, || self.inner.provider.locations())
            .await
    }

    /// Returns one vehicle's trips.
    pub async fn trips(&self, query: &TripQuery, force_refresh: bool) -> Result<Response<Vec<Trip>>, Error> {
        let request = FetchRequest::new(query.trips_key(), "get_trips").force_refresh(force_refresh);
        self.inner
            .orchestrator
            .fetch(request, || self.inner.provider.trips(query))
            .await
    }

    /// Returns one vehicle's GPS trail.
    ///
    /// Falls back to any cached replay of the same vehicle when the exact
    /// range was never cached.
    pub async fn replay(&self, query: &TripQuery, force_refresh: bool) -> Result<Response<Value>, Error> {
        let prefix = CacheKey::prefix("replay", [Some(query.device_id.as_str())]);
        let request = FetchRequest::new(query.replay_key(), "get_replay")
            .force_refresh(force_refresh)
            .fallback_prefix(prefix);
        self.inner
            .orchestrator
            .fetch(request, || self.inner.provider.replay(query))
            .await
    }

    /// Lists geofence zones.
    pub async fn zones(&self, force_refresh: bool) -> Result<Response<Value>, Error> {
        let request = FetchRequest::new(CacheKey::zones(), "get_zones").force_refresh(force_refresh);
        self.inner
            .orchestrator
            .fetch(request, || self.inner.provider.zones())
            .await
    }

    /// Lists active faults, optionally for one device.
    pub async fn faults(&self, device_id: Option<&str>, force_refresh: bool) -> Result<Response<Value>, Error> {
        let request = FetchRequest::new(CacheKey::faults(device_id), "get_faults").force_refresh(force_refresh);
        self.inner
            .orchestrator
            .fetch(request, || self.inner.provider.faults(device_id))
            .await
    }

    /// Lists rule-violation events.
    ///
    /// Falls back to the most recent cached range when the requested one
    /// was never cached.
    pub async fn exceptions(
        &self,
        from: Option<&str>,
        to: Option<&str>,
        force_refresh: bool,
    ) -> Result<Response<Value>, Error> {
        let request = FetchRequest::new(CacheKey::exceptions(from, to), "get_exceptions")
            .force_refresh(force_refresh)
            .fallback_prefix("api_exceptions_");
        self.inner
            .orchestrator
            .fetch(request, || self.inner.provider.exceptions(from, to))
            .await
    }

    /// Returns connectivity and account summary.
    pub async fn status(&self, force_refresh: bool) -> Result<Response<Value>, Error> {
        let request = FetchRequest::new(CacheKey::status(), "get_status").force_refresh(force_refresh);
        self.inner
            .orchestrator
            .fetch(request, || self.inner.provider.status())
            .await
    }

    /// Returns fleet-wide KPIs, extrapolated from a fixed sample of
    /// vehicles.
    ///
    /// Each sampled vehicle's trips go through their own cache key, so a
    /// vehicle whose trips were already viewed costs no upstream call.
    /// Sampled vehicles whose trips cannot be had at all are left out. If
    /// that leaves no trip data and a fetch failed, the KPIs are treated
    /// as failed upstream and degrade to the last cached result.
    pub async fn fleet_kpis(&self, force_refresh: bool) -> Result<Response<FleetKpis>, Error> {
        let request = FetchRequest::new(CacheKey::fleet_kpis(), "get_fleet_kpis").force_refresh(force_refresh);
        self.inner
            .orchestrator
            .fetch(request, || self.compute_kpis())
            .await
    }

    async fn compute_kpis(&self) -> Result<FleetKpis, UpstreamError> {
        let vehicles = self
            .vehicles(false)
            .await
            .map_err(Error::into_upstream)?
            .into_inner();

        let sample = self.inner.sampling.select(&vehicles, |v| v.id.as_str());
        let queries: Vec<TripQuery> = sample.iter().map(|v| TripQuery::new(&v.id)).collect();
        let results = join_all(queries.iter().map(|q| self.trips(q, false))).await;

        let mut rollup = KpiRollup::new(vehicles.len(), sample.len());
        let mut first_error = None;
        for (query, result) in queries.iter().zip(results) {
            match result {
                Ok(trips) => rollup.add_member(trips.data()),
                Err(e) => {
                    log::warn!("leaving {} out of fleet KPIs: {}", query.device_id, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        // All-zero KPIs would overwrite the last good row
        if let (0, Some(e)) = (rollup.members_with_data(), first_error) {
            return Err(e.into_upstream());
        }
        log::debug!(
            "fleet KPIs from {} of {} vehicles, scale {}",
            rollup.members_with_data(),
            vehicles.len(),
            rollup.scale()
        );
        Ok(rollup.finish())
    }

    /// Runs a named read operation through the cache.
    ///
    /// The key hashes `args`; on failure with nothing cached for these exact
    /// args, the most recent result of the same tool is served.
    pub async fn tool<A, T, F, Fut>(
        &self,
        name: &str,
        args: &A,
        force_refresh: bool,
        fetch: F,
    ) -> Result<Response<T>, Error>
    where
        A: Serialize,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let request = FetchRequest::new(CacheKey::tool(name, args)?, name)
            .force_refresh(force_refresh)
            .fallback_prefix(CacheKey::tool_prefix(name));
        self.inner.orchestrator.fetch(request, fetch).await
    }

    /// Creates a zone upstream, then drops the cached zone list.
    pub async fn create_zone(&self, zone: &Value) -> Result<Value, Error> {
        let created = self
            .inner
            .provider
            .create_zone(zone)
            .await
            .map_err(|source| Error::Unavailable {
                key: CacheKey::zones().into_string(),
                operation: "create_zone".to_string(),
                source,
            })?;

        // The zone exists now; a stale list is not worth failing over
        if let Err(e) = self.invalidate(&CacheKey::zones()).await {
            log::warn!("zone created but cached zone list kept: {}", e);
        }
        Ok(created)
    }

    /// Removes `key` from both tiers.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), Error> {
        self.inner.orchestrator.invalidate(key).await
    }
}

// =============================================================================
// Typestate Builder
// =============================================================================

/// Marker type for missing required builder fields.
pub struct Missing;

/// Marker type for set builder fields.
pub struct Set<T>(T);

/// Builder for constructing a [`FleetData`].
///
/// Uses the typestate pattern to ensure required fields are set at compile time.
///
/// # Required Fields
///
/// - `provider` - A [`FleetProvider`] implementation
/// - `store` - The durable tier, any [`DurableStore`]
///
/// # Example
///
/// ```ignore
/// let fleet = FleetData::builder()
///     .provider(my_provider)
///     .store(SqliteStore::open_in_memory().await?)
///     .config(CacheConfig::default().with_sample_size(8))
///     .budget(CallBudget::new(100, Duration::from_secs(60)))
///     .telemetry(Arc::new(LogTelemetry))
///     .build();
/// ```
pub struct FleetDataBuilder<Provider, Store> {
    provider: Provider,
    store: Store,
    memory: Option<Arc<MemoryTier>>,
    config: CacheConfig,
    telemetry: Option<Arc<dyn CallTelemetry>>,
    budget: Option<CallBudget>,
}

impl FleetDataBuilder<Missing, Missing> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            provider: Missing,
            store: Missing,
            memory: None,
            config: CacheConfig::default(),
            telemetry: None,
            budget: None,
        }
    }
}

impl Default for FleetDataBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> FleetDataBuilder<Missing, S> {
    /// Sets the upstream provider.
    pub fn provider<P: FleetProvider + 'static>(
        self,
        provider: P,
    ) -> FleetDataBuilder<Set<Arc<dyn FleetProvider>>, S> {
        FleetDataBuilder {
            provider: Set(Arc::new(provider) as Arc<dyn FleetProvider>),
            store: self.store,
            memory: self.memory,
            config: self.config,
            telemetry: self.telemetry,
            budget: self.budget,
        }
    }
}

impl<P> FleetDataBuilder<P, Missing> {
    /// Sets the durable tier.
    pub fn store<D: DurableStore + 'static>(self, store: D) -> FleetDataBuilder<P, Set<Arc<dyn DurableStore>>> {
        self.shared_store(Arc::new(store))
    }

    /// Sets a durable tier that is also used elsewhere.
    pub fn shared_store(self, store: Arc<dyn DurableStore>) -> FleetDataBuilder<P, Set<Arc<dyn DurableStore>>> {
        FleetDataBuilder {
            provider: self.provider,
            store: Set(store),
            memory: self.memory,
            config: self.config,
            telemetry: self.telemetry,
            budget: self.budget,
        }
    }
}

impl<P, S> FleetDataBuilder<P, S> {
    /// Shares an existing memory tier.
    ///
    /// If not set, a fresh one is created.
    pub fn memory(mut self, memory: Arc<MemoryTier>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Sets the cache configuration.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the telemetry sink.
    ///
    /// Defaults to discarding events.
    pub fn telemetry(mut self, telemetry: Arc<dyn CallTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Caps live upstream calls.
    pub fn budget(mut self, budget: CallBudget) -> Self {
        self.budget = Some(budget);
        self
    }
}

impl FleetDataBuilder<Set<Arc<dyn FleetProvider>>, Set<Arc<dyn DurableStore>>> {
    /// Builds the [`FleetData`].
    ///
    /// This method is only available when both `provider` and `store` have been set.
    pub fn build(self) -> FleetData {
        let memory = self.memory.unwrap_or_default();
        let sampling = SamplePolicy::new(self.config.sample_size);

        let mut orchestrator = FetchOrchestrator::new(memory, self.store.0).with_config(self.config);
        if let Some(telemetry) = self.telemetry {
            orchestrator = orchestrator.with_telemetry(telemetry);
        }
        if let Some(budget) = self.budget {
            orchestrator = orchestrator.with_budget(budget);
        }

        FleetData {
            inner: Arc::new(FleetDataInner {
                provider: self.provider.0,
                orchestrator,
                sampling,
            }),
        }
    }
}

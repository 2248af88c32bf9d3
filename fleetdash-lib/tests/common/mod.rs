//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;

use fleetdash_lib::cache::CacheEntry;
use fleetdash_lib::cache::DurableStore;
use fleetdash_lib::cache::MemoryTier;
use fleetdash_lib::cache::SqliteStore;
use fleetdash_lib::error::StoreError;
use fleetdash_lib::error::UpstreamError;
use fleetdash_lib::fetch::FetchOrchestrator;
use fleetdash_lib::provider::FleetProvider;
use fleetdash_lib::provider::Trip;
use fleetdash_lib::provider::TripQuery;
use fleetdash_lib::provider::Vehicle;
use fleetdash_lib::telemetry::CallEvent;
use fleetdash_lib::telemetry::CallTelemetry;
use fleetdash_lib::telemetry::Outcome;

// =============================================================================
// Upstream
// =============================================================================

/// A scripted upstream operation that counts its calls.
#[derive(Default)]
pub struct Upstream {
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl Upstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Returns `{"call": n}` for the n-th call, or a network error.
    pub async fn call(&self) -> Result<Value, UpstreamError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::network("connection refused"));
        }
        Ok(json!({ "call": n }))
    }
}

// =============================================================================
// Telemetry
// =============================================================================

/// Keeps every event for inspection.
#[derive(Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<CallEvent>>,
}

impl RecordingTelemetry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.events().into_iter().map(|e| e.outcome).collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl CallTelemetry for RecordingTelemetry {
    async fn record(&self, event: CallEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// =============================================================================
// Durable store
// =============================================================================

/// A SQLite store whose writes (or reads) can be made to fail.
pub struct FlakyStore {
    inner: SqliteStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl FlakyStore {
    pub async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteStore::open_in_memory().await.unwrap(),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        })
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Database(async_sqlite::Error::Closed))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DurableStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.get(key).await
    }

    async fn get_fresh(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.get_fresh(key).await
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<CacheEntry>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.get_by_prefix(prefix).await
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.set(entry).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.delete(key).await
    }

    async fn list_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.list_keys_with_prefix(prefix).await
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.clear().await
    }
}

// =============================================================================
// Orchestrator fixture
// =============================================================================

pub struct Fixture {
    pub orchestrator: FetchOrchestrator,
    pub memory: Arc<MemoryTier>,
    pub store: Arc<FlakyStore>,
    pub telemetry: Arc<RecordingTelemetry>,
}

pub async fn fixture() -> Fixture {
    let memory = Arc::new(MemoryTier::new());
    let store = FlakyStore::new().await;
    let telemetry = RecordingTelemetry::new();
    let orchestrator = FetchOrchestrator::new(memory.clone(), store.clone())
        .with_telemetry(telemetry.clone());
    Fixture {
        orchestrator,
        memory,
        store,
        telemetry,
    }
}

/// Writes a row into the durable tier as if cached `age` ago.
pub async fn seed(store: &dyn DurableStore, key: &str, payload: &Value, age: chrono::Duration, ttl: u64) {
    let cached_at = chrono::Utc::now() - age;
    let entry = CacheEntry::new(key, serde_json::to_vec(payload).unwrap(), cached_at, ttl);
    store.set(entry).await.unwrap();
}

// =============================================================================
// Provider
// =============================================================================

/// An in-memory fleet with per-operation call counters.
pub struct FakeProvider {
    vehicles: Vec<Vehicle>,
    trips: HashMap<String, Vec<Trip>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: AtomicBool,
    failing_devices: Mutex<Vec<String>>,
}

impl FakeProvider {
    /// A fleet of `size` vehicles `v01..`, each with one 100 km trip of
    /// 4 hours driving.
    pub fn fleet(size: usize) -> Arc<Self> {
        let vehicles: Vec<Vehicle> = (1..=size)
            .map(|i| Vehicle::new(format!("v{i:02}")).with_name(format!("Van {i}")))
            .collect();
        let trips = vehicles
            .iter()
            .map(|v| (v.id.clone(), vec![Trip::new(100_000.0, 4.0 * 3600.0, 0.0, 100.0)]))
            .collect();
        Arc::new(Self {
            vehicles,
            trips,
            calls: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            failing_devices: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fail_device(&self, device_id: &str) {
        self.failing_devices.lock().unwrap().push(device_id.to_string());
    }

    fn hit(&self, operation: &'static str) -> Result<(), UpstreamError> {
        *self.calls.lock().unwrap().entry(operation).or_default() += 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::rate_limited("quota exceeded", None));
        }
        Ok(())
    }
}

/// Lets tests keep an `Arc` to the provider they hand to the builder.
pub struct SharedProvider(pub Arc<FakeProvider>);

#[async_trait]
impl FleetProvider for SharedProvider {
    async fn vehicles(&self) -> Result<Vec<Vehicle>, UpstreamError> {
        self.0.hit("vehicles")?;
        Ok(self.0.vehicles.clone())
    }

    async fn locations(&self) -> Result<Value, UpstreamError> {
        self.0.hit("locations")?;
        Ok(json!([]))
    }

    async fn trips(&self, query: &TripQuery) -> Result<Vec<Trip>, UpstreamError> {
        self.0.hit("trips")?;
        if self.0.failing_devices.lock().unwrap().contains(&query.device_id) {
            return Err(UpstreamError::Timeout(Duration::from_secs(30)));
        }
        Ok(self.0.trips.get(&query.device_id).cloned().unwrap_or_default())
    }

    async fn replay(&self, query: &TripQuery) -> Result<Value, UpstreamError> {
        self.0.hit("replay")?;
        Ok(json!({ "device": query.device_id, "from": query.from, "points": [] }))
    }

    async fn zones(&self) -> Result<Value, UpstreamError> {
        self.0.hit("zones")?;
        Ok(json!([{ "name": "Depot" }]))
    }

    async fn faults(&self, device_id: Option<&str>) -> Result<Value, UpstreamError> {
        self.0.hit("faults")?;
        Ok(json!({ "device": device_id, "faults": [] }))
    }

    async fn exceptions(&self, from: Option<&str>, _to: Option<&str>) -> Result<Value, UpstreamError> {
        self.0.hit("exceptions")?;
        Ok(json!({ "from": from, "events": [] }))
    }

    async fn status(&self) -> Result<Value, UpstreamError> {
        self.0.hit("status")?;
        Ok(json!({ "connected": true }))
    }

    async fn create_zone(&self, zone: &Value) -> Result<Value, UpstreamError> {
        self.0.hit("create_zone")?;
        Ok(json!({ "id": "z1", "zone": zone }))
    }
}

//! Fleet facade behavior over a fake provider.

mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;

use fleetdash_lib::FleetData;
use fleetdash_lib::Response;
use fleetdash_lib::cache::CacheConfig;
use fleetdash_lib::cache::DurableStore;
use fleetdash_lib::cache::MemoryTier;
use fleetdash_lib::cache::SqliteStore;
use fleetdash_lib::error::UpstreamError;
use fleetdash_lib::keys::CacheKey;
use fleetdash_lib::provider::TripQuery;
use fleetdash_lib::rate_limit::CallBudget;
use fleetdash_lib::sampling::FleetKpis;
use fleetdash_lib::telemetry::Outcome;

use common::FakeProvider;
use common::RecordingTelemetry;
use common::SharedProvider;

async fn fleet(provider: &Arc<FakeProvider>) -> FleetData {
    FleetData::builder()
        .provider(SharedProvider(provider.clone()))
        .store(SqliteStore::open_in_memory().await.unwrap())
        .build()
}

// =============================================================================
// KPIs
// =============================================================================

#[tokio::test]
async fn test_kpis_extrapolate_from_five_vehicles() {
    let provider = FakeProvider::fleet(50);
    let fleet = fleet(&provider).await;

    let kpis = fleet.fleet_kpis(false).await.unwrap().into_inner();

    assert_eq!(provider.calls("vehicles"), 1);
    assert_eq!(provider.calls("trips"), 5);
    assert_eq!(kpis.fleet_size, 50);
    assert_eq!(kpis.vehicles_sampled, 5);
    assert_eq!(kpis.scale, 10.0);
    assert_eq!(kpis.total_distance_km, 5000.0);
    assert_eq!(kpis.total_driving_hours, 200.0);
    assert_eq!(kpis.max_speed_kmh, 100.0);
}

#[tokio::test]
async fn test_kpis_reuse_cached_trips() {
    let provider = FakeProvider::fleet(50);
    let fleet = fleet(&provider).await;

    // Viewing two sampled vehicles first pays for their trips
    fleet.trips(&TripQuery::new("v01"), false).await.unwrap();
    fleet.trips(&TripQuery::new("v02"), false).await.unwrap();
    assert_eq!(provider.calls("trips"), 2);

    fleet.fleet_kpis(false).await.unwrap();
    assert_eq!(provider.calls("trips"), 5);
}

#[tokio::test]
async fn test_kpis_are_stable_across_refreshes() {
    let provider = FakeProvider::fleet(50);
    let fleet = fleet(&provider).await;

    let first = fleet.fleet_kpis(false).await.unwrap().into_inner();
    let second = fleet.fleet_kpis(true).await.unwrap().into_inner();

    assert_eq!(first, second);
    // Forced KPIs reuse the cached vehicles and trips
    assert_eq!(provider.calls("trips"), 5);
}

#[tokio::test]
async fn test_kpis_skip_failed_members() {
    let provider = FakeProvider::fleet(20);
    provider.fail_device("v03");
    let fleet = fleet(&provider).await;

    let kpis = fleet.fleet_kpis(false).await.unwrap().into_inner();

    assert_eq!(kpis.vehicles_sampled, 5);
    assert_eq!(kpis.vehicles_with_trips, 4);
    assert_eq!(kpis.scale, 5.0);
}

#[tokio::test]
async fn test_forced_kpis_survive_outage_from_cached_members() {
    let provider = FakeProvider::fleet(10);
    let fleet = fleet(&provider).await;
    let fresh = fleet.fleet_kpis(false).await.unwrap().into_inner();

    provider.fail(true);
    let again = fleet.fleet_kpis(true).await.unwrap();

    assert!(again.is_live());
    assert_eq!(again.into_inner(), fresh);
}

#[tokio::test]
async fn test_forced_refresh_degrades_when_provider_is_down() {
    let provider = FakeProvider::fleet(1);
    let fleet = fleet(&provider).await;
    fleet.zones(false).await.unwrap();

    provider.fail(true);
    let zones = fleet.zones(true).await.unwrap();

    assert!(zones.is_degraded());
    assert_eq!(zones.data()[0]["name"], "Depot");
}

#[tokio::test]
async fn test_kpis_fail_when_no_member_has_trips() {
    let provider = FakeProvider::fleet(10);
    let fleet = fleet(&provider).await;
    fleet.vehicles(false).await.unwrap();

    provider.fail(true);
    let error = fleet.fleet_kpis(false).await.unwrap_err();

    assert!(error.upstream().unwrap().is_rate_limited());
    let durable = fleet.orchestrator().durable();
    assert!(durable.get(CacheKey::fleet_kpis().as_str()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_kpis_keep_last_good_row_when_trips_are_gone() {
    let provider = FakeProvider::fleet(10);
    let fleet = fleet(&provider).await;
    let good = fleet.fleet_kpis(false).await.unwrap().into_inner();
    for id in ["v01", "v02", "v03", "v04", "v05"] {
        fleet.invalidate(&TripQuery::new(id).trips_key()).await.unwrap();
    }

    provider.fail(true);
    let kpis = fleet.fleet_kpis(true).await.unwrap();

    assert!(kpis.is_degraded());
    assert_eq!(kpis.into_inner(), good);
    let row = fleet
        .orchestrator()
        .durable()
        .get(CacheKey::fleet_kpis().as_str())
        .await
        .unwrap()
        .expect("row");
    let stored: FleetKpis = serde_json::from_slice(&row.payload).unwrap();
    assert_eq!(stored, good);
}

#[tokio::test]
async fn test_kpis_unavailable_on_cold_start_outage() {
    let provider = FakeProvider::fleet(10);
    provider.fail(true);
    let fleet = fleet(&provider).await;

    let error = fleet.fleet_kpis(false).await.unwrap_err();
    assert!(error.upstream().unwrap().is_rate_limited());
}

#[tokio::test]
async fn test_kpis_respect_sample_size() {
    let provider = FakeProvider::fleet(12);
    let fleet = FleetData::builder()
        .provider(SharedProvider(provider.clone()))
        .store(SqliteStore::open_in_memory().await.unwrap())
        .config(CacheConfig::default().with_sample_size(3))
        .build();

    let kpis = fleet.fleet_kpis(false).await.unwrap().into_inner();
    assert_eq!(provider.calls("trips"), 3);
    assert_eq!(kpis.scale, 4.0);
}

// =============================================================================
// Datasets
// =============================================================================

#[tokio::test]
async fn test_create_zone_invalidates_zone_list() {
    let provider = FakeProvider::fleet(1);
    let fleet = fleet(&provider).await;

    fleet.zones(false).await.unwrap();
    fleet.zones(false).await.unwrap();
    assert_eq!(provider.calls("zones"), 1);

    let created = fleet.create_zone(&json!({"name": "Yard"})).await.unwrap();
    assert_eq!(created["id"], "z1");

    fleet.zones(false).await.unwrap();
    assert_eq!(provider.calls("zones"), 2);
}

#[tokio::test]
async fn test_failed_create_zone_keeps_cache() {
    let provider = FakeProvider::fleet(1);
    let fleet = fleet(&provider).await;
    fleet.zones(false).await.unwrap();

    provider.fail(true);
    assert!(fleet.create_zone(&json!({"name": "Yard"})).await.is_err());

    let zones = fleet.zones(false).await.unwrap();
    assert!(zones.is_cached());
}

#[tokio::test]
async fn test_replay_falls_back_to_other_range() {
    let provider = FakeProvider::fleet(1);
    let fleet = fleet(&provider).await;
    let january = TripQuery::new("v01").between("2026-01-01", "2026-01-31");
    fleet.replay(&january, false).await.unwrap();

    provider.fail(true);
    let february = TripQuery::new("v01").between("2026-02-01", "2026-02-28");
    let replay = fleet.replay(&february, false).await.unwrap();

    assert!(replay.is_degraded());
    assert_eq!(replay.data()["from"], "2026-01-01");

    let other_vehicle = TripQuery::new("v02").between("2026-02-01", "2026-02-28");
    assert!(fleet.replay(&other_vehicle, false).await.is_err());
}

#[tokio::test]
async fn test_faults_are_keyed_by_device() {
    let provider = FakeProvider::fleet(1);
    let fleet = fleet(&provider).await;

    fleet.faults(None, false).await.unwrap();
    fleet.faults(Some("v01"), false).await.unwrap();
    fleet.faults(Some("v01"), false).await.unwrap();

    assert_eq!(provider.calls("faults"), 2);
}

#[tokio::test]
async fn test_tool_results_are_cached_by_args() {
    let provider = FakeProvider::fleet(1);
    let fleet = fleet(&provider).await;
    let calls = AtomicUsize::new(0);
    let run = || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, UpstreamError>(json!({"rows": 3})) }
    };

    let args = json!({"device": "v01", "limit": 20});
    let _: Response<Value> = fleet.tool("get_logs", &args, false, run).await.unwrap();
    let reordered = json!({"limit": 20, "device": "v01"});
    let again: Response<Value> = fleet.tool("get_logs", &reordered, false, run).await.unwrap();

    assert!(again.is_cached());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let down = || async { Err::<Value, _>(UpstreamError::network("reset")) };
    let other_args = json!({"device": "v02"});
    let fallback: Response<Value> = fleet.tool("get_logs", &other_args, false, down).await.unwrap();
    assert!(fallback.is_degraded());
    assert_eq!(fallback.data()["rows"], 3);
}

#[tokio::test]
async fn test_invalidate_by_key() {
    let provider = FakeProvider::fleet(3);
    let fleet = fleet(&provider).await;

    fleet.vehicles(false).await.unwrap();
    fleet.invalidate(&CacheKey::vehicles()).await.unwrap();
    let vehicles = fleet.vehicles(false).await.unwrap();

    assert!(vehicles.is_live());
    assert_eq!(vehicles.data().len(), 3);
    assert_eq!(provider.calls("vehicles"), 2);
}

// =============================================================================
// Builder options
// =============================================================================

#[tokio::test]
async fn test_budget_and_telemetry_are_wired() {
    let provider = FakeProvider::fleet(3);
    let telemetry = RecordingTelemetry::new();
    let fleet = FleetData::builder()
        .provider(SharedProvider(provider.clone()))
        .store(SqliteStore::open_in_memory().await.unwrap())
        .telemetry(telemetry.clone())
        .budget(CallBudget::new(1, Duration::from_secs(60)))
        .build();

    fleet.status(false).await.unwrap();
    assert!(fleet.locations(false).await.is_err());

    assert_eq!(provider.total_calls(), 1);
    assert_eq!(telemetry.outcomes(), [Outcome::Success, Outcome::Error]);
}

#[tokio::test]
async fn test_shared_memory_tier() {
    let provider = FakeProvider::fleet(3);
    let memory = Arc::new(MemoryTier::new());
    let fleet = FleetData::builder()
        .provider(SharedProvider(provider.clone()))
        .store(SqliteStore::open_in_memory().await.unwrap())
        .memory(memory.clone())
        .build();

    fleet.exceptions(Some("2026-01-01"), None, false).await.unwrap();
    assert!(memory.get("api_exceptions_2026-01-01_None").is_some());
}

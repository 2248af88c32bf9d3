//! Fleet KPI rollup over a sample

use serde::Deserialize;
use serde::Serialize;

use crate::provider::Trip;

/// Fleet-wide KPIs extrapolated from a sample.
///
/// Summed metrics (`total_*`) are scaled to the fleet; `max_speed_kmh`,
/// `idle_percent` and `avg_trips_per_vehicle` describe the sample as
/// observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetKpis {
    pub total_distance_km: f64,
    pub total_trips: u64,
    pub total_driving_hours: f64,
    pub total_idle_hours: f64,
    pub idle_percent: f64,
    pub max_speed_kmh: f64,
    pub avg_trips_per_vehicle: f64,
    pub fleet_size: usize,
    pub vehicles_sampled: usize,
    pub vehicles_with_trips: usize,
    pub scale: f64,
}

/// Accumulates sampled vehicles' trips into [`FleetKpis`].
///
/// # Example
///
/// ```
/// use fleetdash_lib::provider::Trip;
/// use fleetdash_lib::sampling::KpiRollup;
///
/// let mut rollup = KpiRollup::new(20, 2);
/// rollup.add_member(&[Trip::new(40_000.0, 3600.0, 600.0, 96.0)]);
/// rollup.add_member(&[]);
///
/// let kpis = rollup.finish();
/// assert_eq!(kpis.scale, 20.0);
/// assert_eq!(kpis.total_distance_km, 800.0);
/// assert_eq!(kpis.max_speed_kmh, 96.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct KpiRollup {
    population: usize,
    sampled: usize,
    with_data: usize,
    trips: u64,
    distance_m: f64,
    driving_s: f64,
    idle_s: f64,
    max_speed: f64,
}

impl KpiRollup {
    /// Starts a rollup for a fleet of `population` vehicles of which
    /// `sampled` were selected.
    pub fn new(population: usize, sampled: usize) -> Self {
        Self {
            population,
            sampled,
            ..Self::default()
        }
    }

    /// Adds one sampled vehicle's trips. A vehicle with no trips counts as
    /// sampled but contributes nothing.
    pub fn add_member(&mut self, trips: &[Trip]) {
        if trips.is_empty() {
            return;
        }
        self.with_data += 1;
        self.trips += trips.len() as u64;
        for trip in trips {
            self.distance_m += trip.distance;
            self.driving_s += trip.driving_duration;
            self.idle_s += trip.idling_duration;
            self.max_speed = self.max_speed.max(trip.maximum_speed);
        }
    }

    /// Returns the extrapolation factor `population / max(with_data, 1)`.
    pub fn scale(&self) -> f64 {
        self.population as f64 / self.with_data.max(1) as f64
    }

    /// Returns the number of sampled vehicles that had trips.
    pub fn members_with_data(&self) -> usize {
        self.with_data
    }

    /// Produces the rounded KPIs.
    pub fn finish(self) -> FleetKpis {
        let scale = self.scale();
        let active = self.driving_s + self.idle_s;
        let idle_percent = if active > 0.0 {
            self.idle_s / active * 100.0
        } else {
            0.0
        };

        FleetKpis {
            total_distance_km: round1(self.distance_m * scale / 1000.0),
            total_trips: (self.trips as f64 * scale).round() as u64,
            total_driving_hours: round1(self.driving_s * scale / 3600.0),
            total_idle_hours: round1(self.idle_s * scale / 3600.0),
            idle_percent: round1(idle_percent),
            max_speed_kmh: round1(self.max_speed),
            avg_trips_per_vehicle: round1(self.trips as f64 / self.with_data.max(1) as f64),
            fleet_size: self.population,
            vehicles_sampled: self.sampled,
            vehicles_with_trips: self.with_data,
            scale,
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

//! Telemetry event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ingested telemetry sample. Immutable after the ingest worker
/// commits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// `evt_<hex>`; externally supplied or generated at ingest.
    pub event_id: String,
    pub vehicle_id: String,
    pub timestamp_utc: DateTime<Utc>,

    pub gps_lat: f64,
    pub gps_lon: f64,
    /// Road speed (km/h).
    pub speed_kmph: f64,
    pub odometer_km: f64,
    pub engine_rpm: f64,
    /// Engine coolant temperature (°C).
    pub engine_coolant_temp_c: f64,
    /// Engine oil temperature (°C).
    #[serde(default)]
    pub engine_oil_temp_c: f64,
    #[serde(default)]
    pub fuel_level_pct: f64,
    /// Battery state of charge (%).
    pub battery_soc_pct: f64,
    /// Battery state of health (%).
    pub battery_soh_pct: f64,
    /// Ordered diagnostic trouble codes, e.g. `P0301`.
    #[serde(default)]
    pub dtc_codes: Vec<String>,

    /// Server-assigned at commit; `None` is the in-flush sentinel.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TelemetryEvent {
    /// Whether the GPS fix is inside the valid coordinate range.
    pub fn gps_in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.gps_lat) && (-180.0..=180.0).contains(&self.gps_lon)
    }

    /// Great-circle distance to another fix, in kilometres.
    pub fn gps_distance_km(&self, other: &Self) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let (lat1, lon1) = (self.gps_lat.to_radians(), self.gps_lon.to_radians());
        let (lat2, lon2) = (other.gps_lat.to_radians(), other.gps_lon.to_radians());
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(lat: f64, lon: f64) -> TelemetryEvent {
        TelemetryEvent {
            event_id: "evt_0000000001".to_string(),
            vehicle_id: "MH-07-AB-1234".to_string(),
            timestamp_utc: Utc::now(),
            gps_lat: lat,
            gps_lon: lon,
            speed_kmph: 0.0,
            odometer_km: 0.0,
            engine_rpm: 0.0,
            engine_coolant_temp_c: 90.0,
            engine_oil_temp_c: 100.0,
            fuel_level_pct: 50.0,
            battery_soc_pct: 80.0,
            battery_soh_pct: 95.0,
            dtc_codes: Vec::new(),
            created_at: None,
        }
    }

    #[test]
    fn gps_range_check() {
        assert!(event(19.07, 72.87).gps_in_range());
        assert!(!event(95.0, 72.87).gps_in_range());
        assert!(!event(19.07, -190.0).gps_in_range());
    }

    #[test]
    fn gps_distance_is_roughly_right() {
        // ~1.3 km between two points in Mumbai about 0.012° of latitude apart.
        let a = event(19.0760, 72.8777);
        let b = event(19.0880, 72.8777);
        let d = a.gps_distance_km(&b);
        assert!(d > 1.2 && d < 1.5, "got {d}");
    }
}

//! Anomaly detection thresholds.
//!
//! Normal operating ranges for the monitored channels; a reading past a
//! threshold maps to the corresponding anomaly type.

/// Coolant above this is `thermal_overheat` (°C).
pub const COOLANT_OVERHEAT_C: f64 = 110.0;

/// Oil above this is `oil_overheat` (°C).
pub const OIL_OVERHEAT_C: f64 = 130.0;

/// State of health below this is `battery_degradation` (%).
pub const BATTERY_SOH_DEGRADED_PCT: f64 = 70.0;

/// State of charge below this is `low_charge` (%).
pub const BATTERY_SOC_LOW_PCT: f64 = 10.0;

/// RPM above this is `rpm_spike`.
pub const RPM_SPIKE: f64 = 6500.0;

/// RPM below this while the vehicle is moving is `rpm_stall`.
pub const RPM_STALL: f64 = 500.0;

/// Speed above which the vehicle counts as moving for stall detection (km/h).
pub const MOVING_SPEED_KMPH: f64 = 5.0;

/// Previous speed above which a drop to zero is `speed_anomaly` (km/h).
pub const SPEED_DROP_FROM_KMPH: f64 = 10.0;

/// GPS jump beyond this between consecutive fixes is `gps_anomaly` (km).
pub const GPS_JUMP_KM: f64 = 1.0;

/// Normal coolant band used for severity scaling (°C).
pub const COOLANT_NORMAL_MAX_C: f64 = 100.0;

/// Normal RPM band used for severity scaling.
pub const RPM_NORMAL_MAX: f64 = 4000.0;

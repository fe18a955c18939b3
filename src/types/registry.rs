//! Operator-maintained registry records: vehicles, service centers, and
//! the short-lived call-context lookup.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered vehicle and its owner contact details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub vehicle_id: String,
    #[serde(default)]
    pub owner_name: Option<String>,
    /// Owner phone in any local format; normalized to E.164 at call time.
    #[serde(default)]
    pub owner_phone: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Daily operating window in center-local wall-clock time (`HH:MM`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub start: String,
    pub end: String,
}

impl Default for DayHours {
    fn default() -> Self {
        Self {
            start: "09:00".to_string(),
            end: "18:00".to_string(),
        }
    }
}

/// Service center registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCenter {
    pub service_center_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// IANA timezone name, e.g. `Asia/Kolkata`.
    pub timezone: String,
    /// Concurrent booking capacity.
    pub capacity: u32,
    /// Weekly schedule keyed by lowercase day name; missing days fall
    /// back to 09:00–18:00.
    #[serde(default)]
    pub operating_hours: BTreeMap<String, DayHours>,
    /// Optional explicit slot list (UTC ISO instants); when empty, slots
    /// are synthesized from the operating hours.
    #[serde(default)]
    pub available_slots: Vec<String>,
    /// Part name → availability marker.
    #[serde(default)]
    pub spare_parts_availability: BTreeMap<String, String>,
    #[serde(default)]
    pub technicians: Vec<String>,
}

/// Short-lived lookup letting the webhook correlate a provider call back
/// to its communication case without touching the bus. Keyed by the
/// provider call SID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallContext {
    pub call_sid: String,
    pub communication_id: String,
    pub engagement_id: String,
    pub case_id: String,
    pub vehicle_id: String,
    pub customer_phone: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub booking_id: Option<String>,
    /// Slot under discussion, for the scheduling turn of the dialog.
    #[serde(default)]
    pub best_slot: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

//! Shared fixtures for the integration suites: a scripted model backend,
//! a ready-made stage context, and record builders.
#![allow(dead_code)] // each integration target uses a different subset

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use auriga::agents::worker::StageContext;
use auriga::bus::InProcessBus;
use auriga::config::PipelineConfig;
use auriga::model::{ModelBackend, ModelError};
use auriga::store::warehouse::NullWarehouse;
use auriga::store::DocumentStore;
use auriga::types::{mint_id, DayHours, ServiceCenter, TelemetryEvent, Vehicle};

struct Script {
    marker: &'static str,
    rate_limits_remaining: AtomicU32,
    responses: Mutex<VecDeque<String>>,
    calls: AtomicU32,
}

/// Deterministic model stub: canned responses selected by a stage marker
/// found in the prompt. The last response for a marker repeats.
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Vec<Script>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, marker: &'static str, response: impl Into<String>) -> Self {
        self.scripts.push(Script {
            marker,
            rate_limits_remaining: AtomicU32::new(0),
            responses: Mutex::new(VecDeque::from([response.into()])),
            calls: AtomicU32::new(0),
        });
        self
    }

    /// Return the rate-limit class for the first `n` calls on this
    /// marker, then the canned response.
    pub fn rate_limit_first(mut self, marker: &'static str, n: u32, response: impl Into<String>) -> Self {
        self.scripts.push(Script {
            marker,
            rate_limits_remaining: AtomicU32::new(n),
            responses: Mutex::new(VecDeque::from([response.into()])),
            calls: AtomicU32::new(0),
        });
        self
    }

    pub fn calls_for(&self, marker: &str) -> u32 {
        self.scripts
            .iter()
            .find(|s| s.marker == marker)
            .map_or(0, |s| s.calls.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl ModelBackend for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let Some(script) = self.scripts.iter().find(|s| prompt.contains(s.marker)) else {
            return Err(ModelError::Backend(format!(
                "no script matches prompt: {}",
                prompt.chars().take(80).collect::<String>()
            )));
        };
        script.calls.fetch_add(1, Ordering::SeqCst);
        let limits = &script.rate_limits_remaining;
        if limits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ModelError::RateLimited);
        }
        let mut responses = script
            .responses
            .lock()
            .map_err(|_| ModelError::Backend("script lock poisoned".to_string()))?;
        match responses.len() {
            0 => Err(ModelError::Backend("script exhausted".to_string())),
            1 => Ok(responses[0].clone()),
            _ => Ok(responses.pop_front().unwrap_or_default()),
        }
    }
}

/// Prompt markers for the scripted model.
pub mod markers {
    pub const ANOMALY: &str = "anomaly-detection agent";
    pub const DIAGNOSIS: &str = "diagnosis agent";
    pub const RCA: &str = "root-cause-analysis agent";
    pub const SCHEDULING: &str = "scheduling agent";
    pub const ENGAGEMENT: &str = "customer-engagement agent";
    pub const FEEDBACK: &str = "feedback agent";
    pub const MANUFACTURING: &str = "manufacturing-quality agent";
}

/// Canned responses for the thermal-overheat path.
pub mod responses {
    pub fn anomaly_thermal(severity: f64) -> String {
        format!(
            r#"{{"vehicle_id": "MH-07-AB-1234", "anomaly_detected": true, "anomaly_type": "thermal_overheat", "severity_score": {severity}}}"#
        )
    }

    pub fn anomaly_clean() -> String {
        r#"{"anomaly_detected": false, "anomaly_type": null, "severity_score": null}"#.to_string()
    }

    pub fn diagnosis_coolant() -> String {
        r#"{"component": "engine_coolant_system", "failure_probability": 0.8, "estimated_rul_days": 15, "severity": "High"}"#.to_string()
    }

    pub fn rca(confidence: f64) -> String {
        format!(
            r#"{{"root_cause": "Coolant pump bearing wear reducing circulation", "confidence": {confidence}, "recommended_action": "Replace coolant pump", "capa_type": "Corrective"}}"#
        )
    }

    pub fn scheduling_pick_first() -> String {
        // No valid slot named: normalization falls back to the first
        // open slot and backfills the fallbacks.
        r#"{"best_slot": "", "service_center": "", "slot_type": "urgent", "fallback_slots": []}"#.to_string()
    }

    pub fn engagement(decision: &str) -> String {
        format!(
            r#"{{"customer_decision": "{decision}", "transcript": [
                {{"speaker": "agent", "text": "We found a cooling issue on your vehicle."}},
                {{"speaker": "customer", "text": "Alright, go ahead."}}
            ]}}"#
        )
    }

    pub fn feedback(label: &str, cei: f64) -> String {
        format!(
            r#"{{"cei_score": {cei}, "validation_label": "{label}", "recommended_retrain": false}}"#
        )
    }

    pub fn manufacturing() -> String {
        r#"{"issue": "Coolant pump batch defect", "capa_recommendation": "Audit the pump supplier batch records", "severity": "Medium", "recurrence_cluster_size": 2}"#.to_string()
    }
}

/// Stage context over a temporary store, an in-process bus and the given
/// model, with test-friendly timings (no jitter, millisecond backoff).
pub fn test_context(model: Arc<dyn ModelBackend>) -> (StageContext, Arc<InProcessBus>) {
    test_context_with(model, PipelineConfig::default())
}

pub fn test_context_with(
    model: Arc<dyn ModelBackend>,
    mut config: PipelineConfig,
) -> (StageContext, Arc<InProcessBus>) {
    config.jitter_max_secs = 0.0;
    config.backoff_initial_secs = 0.05;
    let bus = Arc::new(InProcessBus::new());
    let ctx = StageContext {
        store: DocumentStore::temporary().expect("temporary store"),
        bus: bus.clone(),
        model,
        warehouse: Arc::new(NullWarehouse),
        config: Arc::new(config),
    };
    (ctx, bus)
}

pub fn telemetry_event(vehicle_id: &str, coolant_c: f64, dtc: &[&str]) -> TelemetryEvent {
    TelemetryEvent {
        event_id: mint_id("evt"),
        vehicle_id: vehicle_id.to_string(),
        timestamp_utc: Utc::now(),
        gps_lat: 19.0760,
        gps_lon: 72.8777,
        speed_kmph: 60.0,
        odometer_km: 45230.5,
        engine_rpm: 2500.0,
        engine_coolant_temp_c: coolant_c,
        engine_oil_temp_c: 105.0,
        fuel_level_pct: 55.0,
        battery_soc_pct: 85.0,
        battery_soh_pct: 92.0,
        dtc_codes: dtc.iter().map(|s| (*s).to_string()).collect(),
        created_at: None,
    }
}

pub fn service_center() -> ServiceCenter {
    let mut operating_hours = std::collections::BTreeMap::new();
    for day in [
        "monday", "tuesday", "wednesday", "thursday", "friday", "saturday",
    ] {
        operating_hours.insert(
            day.to_string(),
            DayHours {
                start: "09:00".to_string(),
                end: "18:00".to_string(),
            },
        );
    }
    ServiceCenter {
        service_center_id: "sc_mumbai_01".to_string(),
        name: Some("Mumbai Central Service".to_string()),
        timezone: "Asia/Kolkata".to_string(),
        capacity: 10,
        operating_hours,
        available_slots: vec![],
        spare_parts_availability: std::collections::BTreeMap::new(),
        technicians: vec!["tech_1".to_string(), "tech_2".to_string()],
    }
}

pub fn vehicle(vehicle_id: &str, phone: Option<&str>) -> Vehicle {
    Vehicle {
        vehicle_id: vehicle_id.to_string(),
        owner_name: Some("A. Kulkarni".to_string()),
        owner_phone: phone.map(str::to_string),
        model: Some("EV-400".to_string()),
    }
}

/// An ingested-telemetry envelope, as the fan-out publishes it.
pub fn ingested_signal(event: &TelemetryEvent) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "event_id": event.event_id,
        "vehicle_id": event.vehicle_id,
        "timestamp": event.timestamp_utc.to_rfc3339(),
    }))
    .expect("serialize signal")
}

/// Age a stored anomaly case backwards in time, simulating an old
/// occurrence without sleeping through the suppression window.
pub fn age_anomaly_case(store: &DocumentStore, case_id: &str, seconds: i64) {
    let mut case = store
        .get_anomaly_case(case_id)
        .expect("store read")
        .expect("case exists");
    case.created_at = Some(Utc::now() - Duration::seconds(seconds));
    store
        .put_raw(auriga::store::collections::ANOMALY_CASES, case_id, &case)
        .expect("store write");
}

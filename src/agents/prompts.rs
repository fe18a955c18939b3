//! Prompt builders for the AI-backed stages.
//!
//! Each prompt states the stage role, the closed-set output contract and
//! the assembled context, and demands a bare JSON object back. The exact
//! wording matters less than the contract: responses are normalized
//! against the stage invariants after parsing.

use serde_json::json;
use std::collections::BTreeMap;

use crate::types::{
    AnomalyCase, DiagnosisCase, FeedbackCase, RcaCase, SchedulingCase, TelemetryEvent, Vehicle,
};

fn render(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn anomaly_prompt(vehicle_id: &str, window: &[TelemetryEvent]) -> String {
    let input = json!({ "telemetry_window": window });
    format!(
        "You are the anomaly-detection agent of a predictive vehicle-maintenance pipeline.\n\
         Analyze the telemetry window for vehicle {vehicle_id} against these rules:\n\
         - coolant > 110 C => thermal_overheat; oil > 130 C => oil_overheat\n\
         - battery SOH < 70% => battery_degradation; SOC < 10% => low_charge\n\
         - RPM > 6500 => rpm_spike; RPM < 500 while speed > 5 km/h => rpm_stall\n\
         - any DTC code present => dtc_fault\n\
         - speed dropping to 0 from above 10 km/h => speed_anomaly\n\
         - invalid coordinates or a jump above 1 km => gps_anomaly\n\
         Severity is proportional to the deviation, in [0.0, 1.0]. If several rules fire,\n\
         report the one with the highest severity. If nothing fires, anomaly_detected is\n\
         false and both other fields are null.\n\n\
         Telemetry:\n{}\n\n\
         Return ONLY a JSON object: {{\"vehicle_id\", \"anomaly_detected\", \"anomaly_type\", \"severity_score\"}}.",
        render(&input)
    )
}

pub fn diagnosis_prompt(case: &AnomalyCase, window: &[TelemetryEvent]) -> String {
    let input = json!({
        "vehicle_id": case.vehicle_id,
        "anomaly_detected": case.anomaly_detected,
        "anomaly_type": case.anomaly_type,
        "severity_score": case.severity_score,
        "telemetry_window": window,
    });
    format!(
        "You are the diagnosis agent of a predictive vehicle-maintenance pipeline.\n\
         Map the anomaly to the failing component:\n\
         thermal_overheat => engine_coolant_system; oil_overheat => engine_oil_system;\n\
         battery_degradation, low_charge => battery; rpm_spike, rpm_stall => engine;\n\
         dtc_fault => by DTC prefix (P0 engine, P1 transmission);\n\
         speed_anomaly => transmission; gps_anomaly => gps_system.\n\
         Derive failure_probability in [0.0, 1.0] monotonically from the severity score.\n\
         Estimate remaining useful life in days: critical 1-7, serious 7-30, moderate 30-90,\n\
         low 90-180, minimum 1. Severity label: Low below 0.3, Medium below 0.7, else High.\n\n\
         Anomaly:\n{}\n\n\
         Return ONLY a JSON object: {{\"vehicle_id\", \"component\", \"failure_probability\",\n\
         \"estimated_rul_days\", \"severity\"}}.",
        render(&input)
    )
}

pub fn rca_prompt(diagnosis: &DiagnosisCase, window: &[TelemetryEvent]) -> String {
    let input = json!({
        "vehicle_id": diagnosis.vehicle_id,
        "component": diagnosis.component,
        "failure_probability": diagnosis.failure_probability,
        "estimated_rul_days": diagnosis.estimated_rul_days,
        "severity": diagnosis.severity,
        "telemetry_window": window,
    });
    format!(
        "You are the root-cause-analysis agent of a predictive vehicle-maintenance pipeline.\n\
         From the diagnosis and its telemetry context, explain the specific root cause and a\n\
         recommended action. Report your confidence in [0.0, 1.0] honestly; low confidence\n\
         routes the case to human review. capa_type is Corrective when the action addresses\n\
         the immediate failure, Preventive when it targets a process or design change.\n\n\
         Diagnosis:\n{}\n\n\
         Return ONLY a JSON object: {{\"root_cause\", \"confidence\", \"recommended_action\",\n\
         \"capa_type\"}}.",
        render(&input)
    )
}

pub fn scheduling_prompt(
    diagnosis: &DiagnosisCase,
    center_id: &str,
    available_slots: &[String],
    spare_parts: &BTreeMap<String, String>,
    technician_availability: &BTreeMap<String, Vec<String>>,
) -> String {
    let input = json!({
        "vehicle_id": diagnosis.vehicle_id,
        "estimated_rul_days": diagnosis.estimated_rul_days,
        "severity": diagnosis.severity,
        "recommended_center": center_id,
        "available_slots": available_slots,
        "spare_parts_availability": spare_parts,
        "technician_availability": technician_availability,
    });
    format!(
        "You are the scheduling agent of a predictive vehicle-maintenance pipeline.\n\
         Pick best_slot from the available slots (UTC ISO-8601), matching urgency to the\n\
         remaining useful life: urgent below 7 days, normal below 30, delayed otherwise.\n\
         Provide at least two fallback_slots, all with parts and technician availability.\n\n\
         Context:\n{}\n\n\
         Return ONLY a JSON object: {{\"best_slot\", \"service_center\", \"slot_type\",\n\
         \"fallback_slots\"}}.",
        render(&input)
    )
}

pub fn engagement_prompt(
    scheduling: &SchedulingCase,
    rca: Option<&RcaCase>,
    vehicle: Option<&Vehicle>,
) -> String {
    let input = json!({
        "vehicle_id": scheduling.vehicle_id,
        "best_slot": scheduling.best_slot,
        "service_center": scheduling.service_center,
        "slot_type": scheduling.slot_type,
        "root_cause": rca.map(|r| r.root_cause.clone()),
        "recommended_action": rca.map(|r| r.recommended_action.clone()),
        "customer_name": vehicle.and_then(|v| v.owner_name.clone()),
    });
    format!(
        "You are the customer-engagement agent of a predictive vehicle-maintenance pipeline.\n\
         Simulate a short, polite phone conversation offering the proposed service slot.\n\
         Use plain language for the issue. The customer decides: confirmed, declined or\n\
         no_response. transcript is an array of {{\"speaker\": \"agent\"|\"customer\",\n\
         \"text\"}} turns.\n\n\
         Context:\n{}\n\n\
         Return ONLY a JSON object: {{\"customer_decision\", \"transcript\"}}.",
        render(&input)
    )
}

pub fn feedback_prompt(
    case: &AnomalyCase,
    technician_notes: Option<&str>,
    customer_rating: Option<f64>,
    post_service_window: &[TelemetryEvent],
) -> String {
    let input = json!({
        "vehicle_id": case.vehicle_id,
        "original_anomaly_type": case.anomaly_type,
        "original_severity_score": case.severity_score,
        "technician_notes": technician_notes,
        "customer_rating": customer_rating,
        "post_service_telemetry": post_service_window,
    });
    format!(
        "You are the feedback agent of a predictive vehicle-maintenance pipeline.\n\
         Compare the post-service data against the original anomaly. validation_label is\n\
         Correct when the prediction held and the issue is gone, Recurring when the same\n\
         anomaly shows again, Incorrect when the prediction was wrong. cei_score is the\n\
         customer effort index in [1.0, 5.0]. recommended_retrain is true exactly for\n\
         Recurring and Incorrect.\n\n\
         Context:\n{}\n\n\
         Return ONLY a JSON object: {{\"cei_score\", \"validation_label\",\n\
         \"recommended_retrain\"}}.",
        render(&input)
    )
}

pub fn manufacturing_prompt(
    feedback: &FeedbackCase,
    root_cause: Option<&str>,
    recurrence_count: u32,
    fleet_recurrence_count: u32,
    component_recurrence_count: u32,
) -> String {
    let input = json!({
        "vehicle_id": feedback.vehicle_id,
        "validation_label": feedback.validation_label,
        "cei_score": feedback.cei_score,
        "root_cause": root_cause,
        "recurrence_count": recurrence_count,
        "fleet_recurrence_count": fleet_recurrence_count,
        "component_recurrence_count": component_recurrence_count,
    });
    format!(
        "You are the manufacturing-quality agent of a predictive vehicle-maintenance\n\
         pipeline. From the recurrence counts (same vehicle, fleet-wide by anomaly type,\n\
         fleet-wide by component), describe the underlying issue and a specific, actionable\n\
         CAPA recommendation. severity: High for 3+ recurrences, Medium for 2, Low for 1.\n\
         recurrence_cluster_size estimates affected vehicles, at least the largest count.\n\n\
         Context:\n{}\n\n\
         Return ONLY a JSON object: {{\"issue\", \"capa_recommendation\", \"severity\",\n\
         \"recurrence_cluster_size\"}}.",
        render(&input)
    )
}

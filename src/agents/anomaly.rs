//! Anomaly stage (`data_analysis`).
//!
//! Triggered by ingest fan-out. Fetches the last 10 telemetry events for
//! the vehicle, asks the model to classify them against the detection
//! rules, and commits at most one anomaly case per vehicle per quiet
//! period. When no anomaly is found, nothing is written and no event is
//! published.
//!
//! The completion envelope's `confidence` is `1 − severity_score`:
//! higher severity means lower confidence in automated routing. The
//! orchestrator must not re-invert it.

use async_trait::async_trait;
use serde_json::json;

use super::prompts;
use super::worker::{AiStage, Assembled, DuplicateState, StageContext, Subject};
use crate::bus::{envelope::Envelope, publish_json, topics};
use crate::error::{PipelineError, WorkerOutcome};
use crate::model::extract_json;
use crate::store::collections;
use crate::store::warehouse;
use crate::types::thresholds;
use crate::types::{mint_id, AnomalyCase, AnomalyType, CaseStatus, Stage, TelemetryEvent};

/// Rule-based classification of a telemetry window: the strongest firing
/// rule, with a deviation-proportional severity in [0, 1].
pub fn classify_window(window: &[TelemetryEvent]) -> Option<(AnomalyType, f64)> {
    let mut best: Option<(AnomalyType, f64)> = None;
    let mut consider = |anomaly: AnomalyType, severity: f64| {
        let severity = severity.clamp(0.0, 1.0);
        if best.map_or(true, |(_, s)| severity > s) {
            best = Some((anomaly, severity));
        }
    };

    for (i, event) in window.iter().enumerate() {
        let prev = i.checked_sub(1).and_then(|p| window.get(p));

        if event.engine_coolant_temp_c > thresholds::COOLANT_OVERHEAT_C {
            consider(
                AnomalyType::ThermalOverheat,
                deviation(event.engine_coolant_temp_c, thresholds::COOLANT_OVERHEAT_C, 40.0),
            );
        }
        if event.engine_oil_temp_c > thresholds::OIL_OVERHEAT_C {
            consider(
                AnomalyType::OilOverheat,
                deviation(event.engine_oil_temp_c, thresholds::OIL_OVERHEAT_C, 40.0),
            );
        }
        if event.battery_soh_pct < thresholds::BATTERY_SOH_DEGRADED_PCT {
            consider(
                AnomalyType::BatteryDegradation,
                deviation(thresholds::BATTERY_SOH_DEGRADED_PCT, event.battery_soh_pct, 30.0),
            );
        }
        if event.battery_soc_pct < thresholds::BATTERY_SOC_LOW_PCT {
            consider(
                AnomalyType::LowCharge,
                deviation(thresholds::BATTERY_SOC_LOW_PCT, event.battery_soc_pct, 10.0),
            );
        }
        if event.engine_rpm > thresholds::RPM_SPIKE {
            consider(
                AnomalyType::RpmSpike,
                deviation(event.engine_rpm, thresholds::RPM_SPIKE, 1500.0),
            );
        }
        if event.engine_rpm < thresholds::RPM_STALL && event.speed_kmph > thresholds::MOVING_SPEED_KMPH
        {
            consider(
                AnomalyType::RpmStall,
                deviation(thresholds::RPM_STALL, event.engine_rpm, thresholds::RPM_STALL),
            );
        }
        if !event.dtc_codes.is_empty() {
            consider(AnomalyType::DtcFault, 0.3 + 0.15 * event.dtc_codes.len() as f64);
        }
        if let Some(prev) = prev {
            if event.speed_kmph == 0.0 && prev.speed_kmph > thresholds::SPEED_DROP_FROM_KMPH {
                consider(
                    AnomalyType::SpeedAnomaly,
                    deviation(prev.speed_kmph, thresholds::SPEED_DROP_FROM_KMPH, 90.0),
                );
            }
            if event.gps_in_range() && prev.gps_in_range() {
                let jump = event.gps_distance_km(prev);
                if jump > thresholds::GPS_JUMP_KM {
                    consider(
                        AnomalyType::GpsAnomaly,
                        deviation(jump, thresholds::GPS_JUMP_KM, 9.0),
                    );
                }
            }
        }
        if !event.gps_in_range() {
            consider(AnomalyType::GpsAnomaly, 0.8);
        }
    }
    best
}

/// Share of deviation past the threshold, mapped onto [0.3, 1.0] so any
/// firing rule starts at "minor".
fn deviation(value: f64, threshold: f64, span: f64) -> f64 {
    0.3 + 0.7 * ((value - threshold) / span).clamp(0.0, 1.0)
}

/// Normalized model verdict for one window.
#[derive(Debug, Clone)]
pub struct AnomalyVerdict {
    pub anomaly_detected: bool,
    pub anomaly_type: Option<AnomalyType>,
    pub severity_score: Option<f64>,
}

/// The anomaly stage descriptor.
pub struct AnomalyStage;

#[async_trait]
impl AiStage for AnomalyStage {
    type Input = Vec<TelemetryEvent>;
    type Output = AnomalyVerdict;

    fn stage(&self) -> Stage {
        Stage::DataAnalysis
    }

    fn subject(&self, envelope: &Envelope) -> Result<Subject, PipelineError> {
        let vehicle_id = envelope.require_str("vehicle_id")?;
        Ok(Subject::new(vehicle_id, envelope.clone()))
    }

    async fn probe(
        &self,
        ctx: &StageContext,
        subject: &Subject,
    ) -> Result<DuplicateState, PipelineError> {
        // A case already owned downstream blocks new detection outright.
        if let Some(case) = ctx.store.advanced_case_for_vehicle(&subject.vehicle_id)? {
            return Ok(DuplicateState::Advanced { id: case.case_id });
        }
        // A pending case inside the quiet period is a duplicate trigger.
        match ctx.store.latest_pending_case(&subject.vehicle_id)? {
            Some(case) => Ok(DuplicateState::from_existing(
                case.case_id,
                case.created_at,
                ctx.config.duplicate_window(),
            )),
            None => Ok(DuplicateState::Absent),
        }
    }

    async fn assemble(
        &self,
        ctx: &StageContext,
        subject: &Subject,
    ) -> Result<Assembled<Self::Input>, PipelineError> {
        let window = ctx.store.recent_telemetry(&subject.vehicle_id, 10)?;
        if window.is_empty() {
            return Ok(Assembled::Skip {
                reason: format!("no telemetry events for vehicle {}", subject.vehicle_id),
            });
        }
        Ok(Assembled::Ready(window))
    }

    fn build_prompt(&self, subject: &Subject, window: &Self::Input) -> String {
        prompts::anomaly_prompt(&subject.vehicle_id, window)
    }

    fn parse(
        &self,
        _subject: &Subject,
        window: &Self::Input,
        raw: &str,
    ) -> Result<Self::Output, PipelineError> {
        let value = extract_json(raw)?;
        let detected = value
            .get("anomaly_detected")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if !detected {
            // Invariant: no anomaly means type and score are both null.
            return Ok(AnomalyVerdict {
                anomaly_detected: false,
                anomaly_type: None,
                severity_score: None,
            });
        }

        let rule_verdict = classify_window(window);
        let anomaly_type = value
            .get("anomaly_type")
            .and_then(serde_json::Value::as_str)
            .and_then(AnomalyType::parse)
            .or(rule_verdict.map(|(t, _)| t));
        let severity_score = value
            .get("severity_score")
            .and_then(serde_json::Value::as_f64)
            .map(|s| s.clamp(0.0, 1.0))
            .or(rule_verdict.map(|(_, s)| s));

        match (anomaly_type, severity_score) {
            (Some(anomaly_type), score) => Ok(AnomalyVerdict {
                anomaly_detected: true,
                anomaly_type: Some(anomaly_type),
                severity_score: Some(score.unwrap_or(0.5)),
            }),
            // Neither the model nor the rules produced a closed-set
            // type: treat the window as clean.
            (None, _) => Ok(AnomalyVerdict {
                anomaly_detected: false,
                anomaly_type: None,
                severity_score: None,
            }),
        }
    }

    fn has_effect(&self, output: &Self::Output) -> bool {
        output.anomaly_detected
    }

    async fn commit(
        &self,
        ctx: &StageContext,
        subject: &Subject,
        window: Self::Input,
        output: Self::Output,
    ) -> Result<WorkerOutcome, PipelineError> {
        if !output.anomaly_detected {
            return Ok(WorkerOutcome::Clean);
        }

        let case = AnomalyCase {
            case_id: mint_id("case"),
            vehicle_id: subject.vehicle_id.clone(),
            anomaly_detected: true,
            anomaly_type: output.anomaly_type,
            severity_score: output.severity_score,
            telemetry_event_ids: window.iter().map(|e| e.event_id.clone()).collect(),
            status: CaseStatus::PendingDiagnosis,
            created_at: None,
        };
        let case = ctx.store.insert_anomaly_case(case)?;
        warehouse::mirror(ctx.warehouse.as_ref(), collections::ANOMALY_CASES, &case);

        let message = json!({
            "case_id": case.case_id,
            "vehicle_id": case.vehicle_id,
            "anomaly_type": case.anomaly_type,
            "severity_score": case.severity_score,
            "severity": case.severity_label(),
            "confidence": case.routing_confidence(),
            "agent_stage": Stage::DataAnalysis,
        });
        publish_json(ctx.bus.as_ref(), topics::ANOMALY_DETECTED, &message).await?;

        Ok(WorkerOutcome::Committed { id: case.case_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event() -> TelemetryEvent {
        TelemetryEvent {
            event_id: mint_id("evt"),
            vehicle_id: "MH-07-AB-1234".to_string(),
            timestamp_utc: Utc::now(),
            gps_lat: 19.0760,
            gps_lon: 72.8777,
            speed_kmph: 60.0,
            odometer_km: 45230.0,
            engine_rpm: 2500.0,
            engine_coolant_temp_c: 90.0,
            engine_oil_temp_c: 105.0,
            fuel_level_pct: 60.0,
            battery_soc_pct: 85.0,
            battery_soh_pct: 92.0,
            dtc_codes: vec![],
            created_at: None,
        }
    }

    #[test]
    fn clean_window_has_no_verdict() {
        assert!(classify_window(&[event(), event()]).is_none());
    }

    #[test]
    fn coolant_over_threshold_is_thermal_overheat() {
        let mut e = event();
        e.engine_coolant_temp_c = 115.0;
        let (anomaly, severity) = classify_window(&[e]).unwrap();
        assert_eq!(anomaly, AnomalyType::ThermalOverheat);
        assert!(severity > 0.3 && severity <= 1.0);
    }

    #[test]
    fn strongest_rule_wins() {
        let mut e = event();
        e.engine_coolant_temp_c = 112.0; // mild overheat
        e.battery_soc_pct = 1.0; // nearly empty battery
        let (anomaly, _) = classify_window(&[e]).unwrap();
        assert_eq!(anomaly, AnomalyType::LowCharge);
    }

    #[test]
    fn stall_requires_motion() {
        let mut stopped = event();
        stopped.engine_rpm = 300.0;
        stopped.speed_kmph = 0.0;
        assert!(classify_window(&[stopped]).is_none());

        let mut moving = event();
        moving.engine_rpm = 300.0;
        moving.speed_kmph = 30.0;
        let (anomaly, _) = classify_window(&[moving]).unwrap();
        assert_eq!(anomaly, AnomalyType::RpmStall);
    }

    #[test]
    fn speed_drop_needs_previous_sample() {
        let prev = event(); // 60 km/h
        let mut now = event();
        now.speed_kmph = 0.0;
        let (anomaly, _) = classify_window(&[prev, now]).unwrap();
        assert_eq!(anomaly, AnomalyType::SpeedAnomaly);
    }

    #[test]
    fn gps_jump_and_invalid_fix() {
        let prev = event();
        let mut jumped = event();
        jumped.gps_lat += 0.05; // ~5.5 km
        let (anomaly, _) = classify_window(&[prev, jumped]).unwrap();
        assert_eq!(anomaly, AnomalyType::GpsAnomaly);

        let mut invalid = event();
        invalid.gps_lat = 95.0;
        let (anomaly, severity) = classify_window(&[invalid]).unwrap();
        assert_eq!(anomaly, AnomalyType::GpsAnomaly);
        assert!((severity - 0.8).abs() < 1e-9);
    }

    #[test]
    fn parse_normalizes_clean_verdict() {
        let stage = AnomalyStage;
        let subject = Subject::new(
            "V1".to_string(),
            Envelope::decode(br#"{"vehicle_id":"V1"}"#).unwrap(),
        );
        let window = vec![event()];
        // Contradictory response: detected=false with a type attached.
        let verdict = stage
            .parse(
                &subject,
                &window,
                r#"{"anomaly_detected": false, "anomaly_type": "rpm_spike", "severity_score": 0.9}"#,
            )
            .unwrap();
        assert!(!verdict.anomaly_detected);
        assert!(verdict.anomaly_type.is_none());
        assert!(verdict.severity_score.is_none());
    }

    #[test]
    fn parse_falls_back_to_rules_for_unknown_type() {
        let stage = AnomalyStage;
        let subject = Subject::new(
            "V1".to_string(),
            Envelope::decode(br#"{"vehicle_id":"V1"}"#).unwrap(),
        );
        let mut hot = event();
        hot.engine_coolant_temp_c = 120.0;
        let verdict = stage
            .parse(
                &subject,
                &vec![hot],
                r#"{"anomaly_detected": true, "anomaly_type": "engine_too_hot", "severity_score": 1.4}"#,
            )
            .unwrap();
        assert!(verdict.anomaly_detected);
        assert_eq!(verdict.anomaly_type, Some(AnomalyType::ThermalOverheat));
        // Out-of-range score clamped.
        assert!(verdict.severity_score.unwrap() <= 1.0);
    }
}

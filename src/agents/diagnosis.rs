//! Diagnosis stage.
//!
//! Consumes `anomaly-detected`, maps the anomaly to a failing component,
//! derives failure probability and remaining useful life, and advances
//! the anomaly case to `diagnosed`.

use async_trait::async_trait;
use serde_json::json;

use super::prompts;
use super::worker::{AiStage, Assembled, DuplicateState, StageContext, Subject};
use crate::bus::{envelope::Envelope, publish_json, topics};
use crate::error::{PipelineError, WorkerOutcome};
use crate::model::extract_json;
use crate::store::collections;
use crate::store::warehouse;
use crate::types::{
    mint_id, AnomalyCase, AnomalyType, CaseStatus, DiagnosisCase, DiagnosisStatus, Severity, Stage,
    TelemetryEvent,
};

/// Fixed component table. DTC faults split on the code prefix.
pub fn component_for(anomaly_type: AnomalyType, dtc_codes: &[String]) -> &'static str {
    match anomaly_type {
        AnomalyType::ThermalOverheat => "engine_coolant_system",
        AnomalyType::OilOverheat => "engine_oil_system",
        AnomalyType::BatteryDegradation | AnomalyType::LowCharge => "battery",
        AnomalyType::RpmSpike | AnomalyType::RpmStall => "engine",
        AnomalyType::DtcFault => match dtc_codes.first().map(String::as_str) {
            Some(code) if code.starts_with("P1") => "transmission",
            _ => "engine",
        },
        AnomalyType::SpeedAnomaly => "transmission",
        AnomalyType::GpsAnomaly => "gps_system",
    }
}

/// Closed set of components a diagnosis may name.
pub const COMPONENTS: [&str; 7] = [
    "engine_coolant_system",
    "engine_oil_system",
    "battery",
    "engine",
    "transmission",
    "brake_system",
    "gps_system",
];

/// RUL band by severity score: critical 1–7 days, serious 7–30,
/// moderate 30–90, low 90–180. Floor 1.
pub fn rul_band_days(severity_score: f64) -> (u32, u32) {
    if severity_score > 0.8 {
        (1, 7)
    } else if severity_score >= 0.7 {
        (7, 30)
    } else if severity_score >= 0.4 {
        (30, 90)
    } else {
        (90, 180)
    }
}

pub struct DiagnosisInput {
    pub case: AnomalyCase,
    pub window: Vec<TelemetryEvent>,
}

#[derive(Debug, Clone)]
pub struct DiagnosisVerdict {
    pub component: String,
    pub failure_probability: f64,
    pub estimated_rul_days: u32,
    pub severity: Severity,
}

pub struct DiagnosisStage;

#[async_trait]
impl AiStage for DiagnosisStage {
    type Input = DiagnosisInput;
    type Output = DiagnosisVerdict;

    fn stage(&self) -> Stage {
        Stage::Diagnosis
    }

    fn subject(&self, envelope: &Envelope) -> Result<Subject, PipelineError> {
        envelope.require_str("case_id")?;
        let vehicle_id = envelope.require_str("vehicle_id")?;
        Ok(Subject::new(vehicle_id, envelope.clone()))
    }

    async fn probe(
        &self,
        ctx: &StageContext,
        subject: &Subject,
    ) -> Result<DuplicateState, PipelineError> {
        let case_id = subject.envelope.require_str("case_id")?;
        match ctx.store.diagnosis_for_case(&case_id)? {
            Some(existing) => Ok(DuplicateState::from_existing(
                existing.diagnosis_id,
                existing.created_at,
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
        let case_id = subject.envelope.require_str("case_id")?;
        let Some(case) = ctx.store.get_anomaly_case(&case_id)? else {
            return Ok(Assembled::Skip {
                reason: format!("anomaly case {case_id} not found"),
            });
        };
        if case.status.rank() >= CaseStatus::Diagnosed.rank() {
            return Ok(Assembled::Skip {
                reason: format!("case {case_id} already {:?}", case.status),
            });
        }
        let window = ctx.store.telemetry_by_ids(&case.telemetry_event_ids)?;
        Ok(Assembled::Ready(DiagnosisInput { case, window }))
    }

    fn build_prompt(&self, _subject: &Subject, input: &Self::Input) -> String {
        prompts::diagnosis_prompt(&input.case, &input.window)
    }

    fn parse(
        &self,
        _subject: &Subject,
        input: &Self::Input,
        raw: &str,
    ) -> Result<Self::Output, PipelineError> {
        let value = extract_json(raw)?;

        let severity_score = input.case.severity_score.unwrap_or(0.0);
        let dtc_codes: Vec<String> = input
            .window
            .iter()
            .flat_map(|e| e.dtc_codes.clone())
            .collect();
        let table_component = input
            .case
            .anomaly_type
            .map(|t| component_for(t, &dtc_codes));

        // Component must come from the closed set; otherwise fall back
        // to the fixed table.
        let component = value
            .get("component")
            .and_then(serde_json::Value::as_str)
            .filter(|c| COMPONENTS.contains(c))
            .map(str::to_string)
            .or_else(|| table_component.map(str::to_string))
            .unwrap_or_else(|| "engine".to_string());

        let failure_probability = value
            .get("failure_probability")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(severity_score)
            .clamp(0.0, 1.0);

        let (band_low, band_high) = rul_band_days(severity_score);
        let estimated_rul_days = value
            .get("estimated_rul_days")
            .and_then(serde_json::Value::as_u64)
            .map_or(band_low, |d| u32::try_from(d).unwrap_or(band_high))
            .max(1);

        Ok(DiagnosisVerdict {
            component,
            failure_probability,
            estimated_rul_days,
            // Invariant: the label always follows the probability band,
            // whatever the model said.
            severity: Severity::from_failure_probability(failure_probability),
        })
    }

    async fn commit(
        &self,
        ctx: &StageContext,
        _subject: &Subject,
        input: Self::Input,
        output: Self::Output,
    ) -> Result<WorkerOutcome, PipelineError> {
        let diagnosis = DiagnosisCase {
            diagnosis_id: mint_id("diagnosis"),
            case_id: input.case.case_id.clone(),
            vehicle_id: input.case.vehicle_id.clone(),
            component: output.component,
            failure_probability: output.failure_probability,
            estimated_rul_days: output.estimated_rul_days,
            severity: output.severity,
            // Forwarded unchanged for the downstream stages.
            context_event_ids: input.case.telemetry_event_ids.clone(),
            status: DiagnosisStatus::PendingRca,
            created_at: None,
        };
        let diagnosis = ctx.store.insert_diagnosis(diagnosis)?;
        ctx.store
            .set_anomaly_status(&input.case.case_id, CaseStatus::Diagnosed)?;
        warehouse::mirror(ctx.warehouse.as_ref(), collections::DIAGNOSIS_CASES, &diagnosis);

        let message = json!({
            "diagnosis_id": diagnosis.diagnosis_id,
            "case_id": diagnosis.case_id,
            "vehicle_id": diagnosis.vehicle_id,
            "component": diagnosis.component,
            "failure_probability": diagnosis.failure_probability,
            "estimated_rul_days": diagnosis.estimated_rul_days,
            "severity": diagnosis.severity,
            "agent_stage": Stage::Diagnosis,
        });
        publish_json(ctx.bus.as_ref(), topics::DIAGNOSIS_COMPLETE, &message).await?;

        Ok(WorkerOutcome::Committed {
            id: diagnosis.diagnosis_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_table() {
        assert_eq!(
            component_for(AnomalyType::ThermalOverheat, &[]),
            "engine_coolant_system"
        );
        assert_eq!(component_for(AnomalyType::LowCharge, &[]), "battery");
        assert_eq!(
            component_for(AnomalyType::DtcFault, &["P0301".to_string()]),
            "engine"
        );
        assert_eq!(
            component_for(AnomalyType::DtcFault, &["P1234".to_string()]),
            "transmission"
        );
        assert_eq!(component_for(AnomalyType::GpsAnomaly, &[]), "gps_system");
    }

    #[test]
    fn rul_bands_follow_severity() {
        assert_eq!(rul_band_days(0.9), (1, 7));
        assert_eq!(rul_band_days(0.75), (7, 30));
        assert_eq!(rul_band_days(0.5), (30, 90));
        assert_eq!(rul_band_days(0.2), (90, 180));
    }

    #[test]
    fn parse_forces_severity_band_and_component_set() {
        let stage = DiagnosisStage;
        let envelope =
            Envelope::decode(br#"{"case_id":"case_1","vehicle_id":"V1"}"#).unwrap();
        let subject = Subject::new("V1".to_string(), envelope);
        let input = DiagnosisInput {
            case: AnomalyCase {
                case_id: "case_1".to_string(),
                vehicle_id: "V1".to_string(),
                anomaly_detected: true,
                anomaly_type: Some(AnomalyType::ThermalOverheat),
                severity_score: Some(0.75),
                telemetry_event_ids: vec![],
                status: CaseStatus::PendingDiagnosis,
                created_at: None,
            },
            window: vec![],
        };
        // Mislabeled severity and an off-list component.
        let verdict = stage
            .parse(
                &subject,
                &input,
                r#"{"component": "cooling thing", "failure_probability": 0.8, "estimated_rul_days": 15, "severity": "Low"}"#,
            )
            .unwrap();
        assert_eq!(verdict.component, "engine_coolant_system");
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.estimated_rul_days, 15);
    }

    #[test]
    fn parse_floors_rul_at_one_day() {
        let stage = DiagnosisStage;
        let envelope =
            Envelope::decode(br#"{"case_id":"case_1","vehicle_id":"V1"}"#).unwrap();
        let subject = Subject::new("V1".to_string(), envelope);
        let input = DiagnosisInput {
            case: AnomalyCase {
                case_id: "case_1".to_string(),
                vehicle_id: "V1".to_string(),
                anomaly_detected: true,
                anomaly_type: Some(AnomalyType::RpmSpike),
                severity_score: Some(0.95),
                telemetry_event_ids: vec![],
                status: CaseStatus::PendingDiagnosis,
                created_at: None,
            },
            window: vec![],
        };
        let verdict = stage
            .parse(
                &subject,
                &input,
                r#"{"component": "engine", "failure_probability": 0.95, "estimated_rul_days": 0, "severity": "High"}"#,
            )
            .unwrap();
        assert_eq!(verdict.estimated_rul_days, 1);
    }
}

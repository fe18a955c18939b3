//! Root-cause-analysis stage.
//!
//! Consumes routed diagnosis completions, emits the root cause, a
//! recommended action and a confidence score. The confidence is the
//! orchestrator's gating input for this stage and is allowed to be low —
//! low confidence is how the system learns where the model is weak.

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
    mint_id, CapaType, DiagnosisCase, DiagnosisStatus, RcaCase, RcaStatus, Stage, TelemetryEvent,
};

pub struct RcaInput {
    pub diagnosis: DiagnosisCase,
    pub window: Vec<TelemetryEvent>,
}

#[derive(Debug, Clone)]
pub struct RcaVerdict {
    pub root_cause: String,
    pub confidence: f64,
    pub recommended_action: String,
    pub capa_type: CapaType,
}

pub struct RcaStage;

#[async_trait]
impl AiStage for RcaStage {
    type Input = RcaInput;
    type Output = RcaVerdict;

    fn stage(&self) -> Stage {
        Stage::Rca
    }

    fn subject(&self, envelope: &Envelope) -> Result<Subject, PipelineError> {
        envelope.require_str("diagnosis_id")?;
        envelope.require_str("case_id")?;
        let vehicle_id = envelope.require_str("vehicle_id")?;
        Ok(Subject::new(vehicle_id, envelope.clone()))
    }

    async fn probe(
        &self,
        ctx: &StageContext,
        subject: &Subject,
    ) -> Result<DuplicateState, PipelineError> {
        let diagnosis_id = subject.envelope.require_str("diagnosis_id")?;
        match ctx.store.rca_for_diagnosis(&diagnosis_id)? {
            Some(existing) => Ok(DuplicateState::from_existing(
                existing.rca_id,
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
        let diagnosis_id = subject.envelope.require_str("diagnosis_id")?;
        let Some(diagnosis) = ctx.store.get_diagnosis(&diagnosis_id)? else {
            return Ok(Assembled::Skip {
                reason: format!("diagnosis {diagnosis_id} not found"),
            });
        };
        if diagnosis.status.rank() >= DiagnosisStatus::RcaComplete.rank() {
            return Ok(Assembled::Skip {
                reason: format!("diagnosis {diagnosis_id} already {:?}", diagnosis.status),
            });
        }
        let window = ctx.store.telemetry_by_ids(&diagnosis.context_event_ids)?;
        Ok(Assembled::Ready(RcaInput { diagnosis, window }))
    }

    fn build_prompt(&self, _subject: &Subject, input: &Self::Input) -> String {
        prompts::rca_prompt(&input.diagnosis, &input.window)
    }

    fn parse(
        &self,
        _subject: &Subject,
        input: &Self::Input,
        raw: &str,
    ) -> Result<Self::Output, PipelineError> {
        let value = extract_json(raw)?;
        let root_cause = value
            .get("root_cause")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!("Undetermined failure pattern in {}", input.diagnosis.component)
            });
        let confidence = value
            .get("confidence")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let recommended_action = value
            .get("recommended_action")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Inspect {}", input.diagnosis.component));
        let capa_type = value
            .get("capa_type")
            .and_then(serde_json::Value::as_str)
            .and_then(CapaType::parse)
            .unwrap_or(CapaType::Corrective);

        Ok(RcaVerdict {
            root_cause,
            confidence,
            recommended_action,
            capa_type,
        })
    }

    async fn commit(
        &self,
        ctx: &StageContext,
        _subject: &Subject,
        input: Self::Input,
        output: Self::Output,
    ) -> Result<WorkerOutcome, PipelineError> {
        let rca = RcaCase {
            rca_id: mint_id("rca"),
            diagnosis_id: input.diagnosis.diagnosis_id.clone(),
            case_id: input.diagnosis.case_id.clone(),
            vehicle_id: input.diagnosis.vehicle_id.clone(),
            root_cause: output.root_cause,
            confidence: output.confidence,
            recommended_action: output.recommended_action,
            capa_type: output.capa_type,
            status: RcaStatus::PendingScheduling,
            created_at: None,
        };
        let rca = ctx.store.insert_rca(rca)?;
        ctx.store
            .set_diagnosis_status(&input.diagnosis.diagnosis_id, DiagnosisStatus::RcaComplete)?;
        warehouse::mirror(ctx.warehouse.as_ref(), collections::RCA_CASES, &rca);

        let message = json!({
            "rca_id": rca.rca_id,
            "diagnosis_id": rca.diagnosis_id,
            "case_id": rca.case_id,
            "vehicle_id": rca.vehicle_id,
            "root_cause": rca.root_cause,
            "confidence": rca.confidence,
            "recommended_action": rca.recommended_action,
            "capa_type": rca.capa_type,
            "agent_stage": Stage::Rca,
        });
        publish_json(ctx.bus.as_ref(), topics::RCA_COMPLETE, &message).await?;

        Ok(WorkerOutcome::Committed { id: rca.rca_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn input() -> RcaInput {
        RcaInput {
            diagnosis: DiagnosisCase {
                diagnosis_id: "diagnosis_1".to_string(),
                case_id: "case_1".to_string(),
                vehicle_id: "V1".to_string(),
                component: "engine_coolant_system".to_string(),
                failure_probability: 0.8,
                estimated_rul_days: 15,
                severity: Severity::High,
                context_event_ids: vec![],
                status: DiagnosisStatus::PendingRca,
                created_at: None,
            },
            window: vec![],
        }
    }

    #[test]
    fn parse_clamps_confidence_and_defaults_capa() {
        let stage = RcaStage;
        let envelope = Envelope::decode(
            br#"{"diagnosis_id":"diagnosis_1","case_id":"case_1","vehicle_id":"V1"}"#,
        )
        .unwrap();
        let subject = Subject::new("V1".to_string(), envelope);
        let verdict = stage
            .parse(
                &subject,
                &input(),
                r#"{"root_cause": "coolant pump bearing wear", "confidence": 1.7, "recommended_action": "replace pump", "capa_type": "corrective"}"#,
            )
            .unwrap();
        assert!((verdict.confidence - 1.0).abs() < f64::EPSILON);
        // Case-sensitive enum: "corrective" is not "Corrective".
        assert_eq!(verdict.capa_type, CapaType::Corrective);
        assert_eq!(verdict.root_cause, "coolant pump bearing wear");
    }

    #[test]
    fn parse_accepts_preventive() {
        let stage = RcaStage;
        let envelope = Envelope::decode(
            br#"{"diagnosis_id":"diagnosis_1","case_id":"case_1","vehicle_id":"V1"}"#,
        )
        .unwrap();
        let subject = Subject::new("V1".to_string(), envelope);
        let verdict = stage
            .parse(
                &subject,
                &input(),
                r#"{"root_cause": "undersized radiator", "confidence": 0.6, "recommended_action": "revise the cooling system design", "capa_type": "Preventive"}"#,
            )
            .unwrap();
        assert_eq!(verdict.capa_type, CapaType::Preventive);
        assert!((verdict.confidence - 0.6).abs() < f64::EPSILON);
    }
}

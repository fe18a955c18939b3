//! Manufacturing-quality stage.
//!
//! Consumes routed feedback completions, aggregates recurrence three
//! ways — same vehicle, fleet-wide by anomaly type, fleet-wide by
//! component — and emits a CAPA recommendation with a severity band and
//! an estimated recurrence cluster size.

use async_trait::async_trait;
use serde_json::json;

use super::prompts;
use super::worker::{AiStage, Assembled, DuplicateState, StageContext, Subject};
use crate::bus::{envelope::Envelope, publish_json, topics};
use crate::error::{PipelineError, WorkerOutcome};
use crate::model::extract_json;
use crate::store::collections;
use crate::store::warehouse;
use crate::types::{mint_id, FeedbackCase, ManufacturingCase, RcaCase, Severity, Stage};

pub struct ManufacturingInput {
    pub feedback: FeedbackCase,
    pub rca: Option<RcaCase>,
    pub recurrence_count: u32,
    pub fleet_recurrence_count: u32,
    pub component_recurrence_count: u32,
}

impl ManufacturingInput {
    /// Largest of the three counts; the cluster size can never be below
    /// it.
    fn estimated_cluster_size(&self) -> u32 {
        self.recurrence_count
            .max(self.fleet_recurrence_count)
            .max(self.component_recurrence_count)
            .max(1)
    }

    fn severity_from_counts(&self) -> Severity {
        if self.recurrence_count >= 3 {
            Severity::High
        } else if self.recurrence_count == 2 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManufacturingVerdict {
    pub issue: String,
    pub capa_recommendation: String,
    pub severity: Severity,
    pub recurrence_cluster_size: u32,
}

pub struct ManufacturingStage;

#[async_trait]
impl AiStage for ManufacturingStage {
    type Input = ManufacturingInput;
    type Output = ManufacturingVerdict;

    fn stage(&self) -> Stage {
        Stage::Manufacturing
    }

    fn subject(&self, envelope: &Envelope) -> Result<Subject, PipelineError> {
        envelope.require_str("feedback_id")?;
        let vehicle_id = envelope.require_str("vehicle_id")?;
        Ok(Subject::new(vehicle_id, envelope.clone()))
    }

    async fn probe(
        &self,
        ctx: &StageContext,
        subject: &Subject,
    ) -> Result<DuplicateState, PipelineError> {
        let feedback_id = subject.envelope.require_str("feedback_id")?;
        match ctx.store.manufacturing_for_feedback(&feedback_id)? {
            Some(existing) => Ok(DuplicateState::from_existing(
                existing.manufacturing_id,
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
        let feedback_id = subject.envelope.require_str("feedback_id")?;
        let Some(feedback) = ctx.store.get_feedback(&feedback_id)? else {
            return Ok(Assembled::Skip {
                reason: format!("feedback {feedback_id} not found"),
            });
        };
        let Some(case) = ctx.store.get_anomaly_case(&feedback.case_id)? else {
            return Ok(Assembled::Skip {
                reason: format!("anomaly case {} not found", feedback.case_id),
            });
        };
        let rca = ctx.store.rca_for_case(&feedback.case_id)?;

        let (recurrence_count, fleet_recurrence_count) = match case.anomaly_type {
            Some(anomaly_type) => (
                ctx.store
                    .count_vehicle_anomalies(&case.vehicle_id, anomaly_type)?,
                ctx.store.count_fleet_anomalies(anomaly_type)?,
            ),
            None => (0, 0),
        };
        let component_recurrence_count = match ctx.store.diagnosis_for_case(&feedback.case_id)? {
            Some(diagnosis) => ctx.store.count_component_diagnoses(&diagnosis.component)?,
            None => 0,
        };

        Ok(Assembled::Ready(ManufacturingInput {
            feedback,
            rca,
            recurrence_count,
            fleet_recurrence_count,
            component_recurrence_count,
        }))
    }

    fn build_prompt(&self, _subject: &Subject, input: &Self::Input) -> String {
        prompts::manufacturing_prompt(
            &input.feedback,
            input.rca.as_ref().map(|r| r.root_cause.as_str()),
            input.recurrence_count,
            input.fleet_recurrence_count,
            input.component_recurrence_count,
        )
    }

    fn parse(
        &self,
        _subject: &Subject,
        input: &Self::Input,
        raw: &str,
    ) -> Result<Self::Output, PipelineError> {
        let value = extract_json(raw)?;
        let issue = value
            .get("issue")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "Recurring component failure".to_string());
        let capa_recommendation = value
            .get("capa_recommendation")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "Review supplier quality records for the affected component".to_string());
        let severity = value
            .get("severity")
            .and_then(serde_json::Value::as_str)
            .and_then(Severity::parse)
            .unwrap_or_else(|| input.severity_from_counts());
        // The model may argue for a larger cluster, never a smaller one.
        let recurrence_cluster_size = value
            .get("recurrence_cluster_size")
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0)
            .max(input.estimated_cluster_size());

        Ok(ManufacturingVerdict {
            issue,
            capa_recommendation,
            severity,
            recurrence_cluster_size,
        })
    }

    async fn commit(
        &self,
        ctx: &StageContext,
        _subject: &Subject,
        input: Self::Input,
        output: Self::Output,
    ) -> Result<WorkerOutcome, PipelineError> {
        let case = ManufacturingCase {
            manufacturing_id: mint_id("manufacturing"),
            feedback_id: input.feedback.feedback_id.clone(),
            case_id: input.feedback.case_id.clone(),
            vehicle_id: input.feedback.vehicle_id.clone(),
            issue: output.issue,
            capa_recommendation: output.capa_recommendation,
            severity: output.severity,
            recurrence_cluster_size: output.recurrence_cluster_size,
            recurrence_count: input.recurrence_count,
            fleet_recurrence_count: input.fleet_recurrence_count,
            component_recurrence_count: input.component_recurrence_count,
            created_at: None,
        };
        let case = ctx.store.insert_manufacturing(case)?;
        warehouse::mirror(
            ctx.warehouse.as_ref(),
            collections::MANUFACTURING_CASES,
            &case,
        );

        let message = json!({
            "manufacturing_id": case.manufacturing_id,
            "feedback_id": case.feedback_id,
            "case_id": case.case_id,
            "vehicle_id": case.vehicle_id,
            "severity": case.severity,
            "recurrence_cluster_size": case.recurrence_cluster_size,
            "agent_stage": Stage::Manufacturing,
        });
        publish_json(ctx.bus.as_ref(), topics::MANUFACTURING_COMPLETE, &message).await?;

        Ok(WorkerOutcome::Committed {
            id: case.manufacturing_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidationLabel;

    fn input(recurrence: u32, fleet: u32, component: u32) -> ManufacturingInput {
        ManufacturingInput {
            feedback: FeedbackCase {
                feedback_id: "feedback_1".to_string(),
                booking_id: "booking_1".to_string(),
                case_id: "case_1".to_string(),
                vehicle_id: "V1".to_string(),
                cei_score: 2.5,
                validation_label: ValidationLabel::Recurring,
                recommended_retrain: true,
                technician_notes: None,
                customer_rating: None,
                created_at: None,
            },
            rca: None,
            recurrence_count: recurrence,
            fleet_recurrence_count: fleet,
            component_recurrence_count: component,
        }
    }

    fn parse(input: &ManufacturingInput, raw: &str) -> ManufacturingVerdict {
        let stage = ManufacturingStage;
        let envelope =
            Envelope::decode(br#"{"feedback_id":"feedback_1","vehicle_id":"V1"}"#).unwrap();
        let subject = Subject::new("V1".to_string(), envelope);
        stage.parse(&subject, input, raw).unwrap()
    }

    #[test]
    fn cluster_size_is_at_least_max_count() {
        let input = input(2, 7, 4);
        // Model lowballs the cluster.
        let verdict = parse(
            &input,
            r#"{"issue": "pump batch defect", "capa_recommendation": "audit supplier", "severity": "Medium", "recurrence_cluster_size": 3}"#,
        );
        assert_eq!(verdict.recurrence_cluster_size, 7);

        // Model argues higher: allowed.
        let verdict = parse(
            &input,
            r#"{"issue": "pump batch defect", "capa_recommendation": "audit supplier", "severity": "Medium", "recurrence_cluster_size": 20}"#,
        );
        assert_eq!(verdict.recurrence_cluster_size, 20);
    }

    #[test]
    fn severity_falls_back_to_counts() {
        let verdict = parse(
            &input(3, 3, 1),
            r#"{"issue": "x", "capa_recommendation": "y", "recurrence_cluster_size": 1}"#,
        );
        assert_eq!(verdict.severity, Severity::High);

        let verdict = parse(
            &input(1, 1, 1),
            r#"{"issue": "x", "capa_recommendation": "y", "recurrence_cluster_size": 1}"#,
        );
        assert_eq!(verdict.severity, Severity::Low);
    }

    #[test]
    fn cluster_floor_is_one() {
        let verdict = parse(
            &input(0, 0, 0),
            r#"{"issue": "x", "capa_recommendation": "y", "severity": "Low"}"#,
        );
        assert_eq!(verdict.recurrence_cluster_size, 1);
    }
}

//! Feedback stage.
//!
//! Triggered by operator-supplied post-service data (booking ID,
//! technician notes, customer rating, optionally a post-service
//! telemetry window). Compares against the original anomaly and scores
//! the customer experience.

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
    mint_id, AnomalyCase, Booking, BookingStatus, FeedbackCase, Stage, TelemetryEvent,
    ValidationLabel,
};

pub struct FeedbackInput {
    pub booking: Booking,
    pub case: AnomalyCase,
    pub post_service_window: Vec<TelemetryEvent>,
    pub technician_notes: Option<String>,
    pub customer_rating: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FeedbackVerdict {
    pub cei_score: f64,
    pub validation_label: ValidationLabel,
    pub recommended_retrain: bool,
}

pub struct FeedbackStage;

#[async_trait]
impl AiStage for FeedbackStage {
    type Input = FeedbackInput;
    type Output = FeedbackVerdict;

    fn stage(&self) -> Stage {
        Stage::Feedback
    }

    fn subject(&self, envelope: &Envelope) -> Result<Subject, PipelineError> {
        envelope.require_str("booking_id")?;
        let vehicle_id = envelope.require_str("vehicle_id")?;
        Ok(Subject::new(vehicle_id, envelope.clone()))
    }

    async fn probe(
        &self,
        ctx: &StageContext,
        subject: &Subject,
    ) -> Result<DuplicateState, PipelineError> {
        let booking_id = subject.envelope.require_str("booking_id")?;
        match ctx.store.feedback_for_booking(&booking_id)? {
            Some(existing) => Ok(DuplicateState::from_existing(
                existing.feedback_id,
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
        let booking_id = subject.envelope.require_str("booking_id")?;
        let Some(booking) = ctx.store.get_booking(&booking_id)? else {
            return Ok(Assembled::Skip {
                reason: format!("booking {booking_id} not found"),
            });
        };
        if booking.status == BookingStatus::FeedbackComplete {
            return Ok(Assembled::Skip {
                reason: format!("booking {booking_id} already has feedback"),
            });
        }
        let Some(case) = ctx.store.get_anomaly_case(&booking.case_id)? else {
            return Ok(Assembled::Skip {
                reason: format!("anomaly case {} not found", booking.case_id),
            });
        };

        // Post-service telemetry comes with the operator message when the
        // vehicle reported after service; otherwise take the latest
        // stored window.
        let post_service_window = match subject.envelope.fields().get("post_service_telemetry") {
            Some(serde_json::Value::Array(events)) => events
                .iter()
                .filter_map(|e| serde_json::from_value(e.clone()).ok())
                .collect(),
            _ => ctx.store.recent_telemetry(&subject.vehicle_id, 5)?,
        };

        Ok(Assembled::Ready(FeedbackInput {
            booking,
            case,
            post_service_window,
            technician_notes: subject.envelope.get_str("technician_notes"),
            customer_rating: subject.envelope.get_f64("customer_rating"),
        }))
    }

    fn build_prompt(&self, _subject: &Subject, input: &Self::Input) -> String {
        prompts::feedback_prompt(
            &input.case,
            input.technician_notes.as_deref(),
            input.customer_rating,
            &input.post_service_window,
        )
    }

    fn parse(
        &self,
        _subject: &Subject,
        _input: &Self::Input,
        raw: &str,
    ) -> Result<Self::Output, PipelineError> {
        let value = extract_json(raw)?;
        let cei_score = value
            .get("cei_score")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(3.0)
            .clamp(1.0, 5.0);
        let validation_label = value
            .get("validation_label")
            .and_then(serde_json::Value::as_str)
            .and_then(ValidationLabel::parse)
            .unwrap_or(ValidationLabel::Correct);
        Ok(FeedbackVerdict {
            cei_score,
            validation_label,
            // Invariant: the retrain flag follows the label, whatever the
            // model said.
            recommended_retrain: validation_label.recommends_retrain(),
        })
    }

    async fn commit(
        &self,
        ctx: &StageContext,
        _subject: &Subject,
        input: Self::Input,
        output: Self::Output,
    ) -> Result<WorkerOutcome, PipelineError> {
        let feedback = FeedbackCase {
            feedback_id: mint_id("feedback"),
            booking_id: input.booking.booking_id.clone(),
            case_id: input.booking.case_id.clone(),
            vehicle_id: input.booking.vehicle_id.clone(),
            cei_score: output.cei_score,
            validation_label: output.validation_label,
            recommended_retrain: output.recommended_retrain,
            technician_notes: input.technician_notes.clone(),
            customer_rating: input.customer_rating,
            created_at: None,
        };
        let feedback = ctx.store.insert_feedback(feedback)?;
        ctx.store
            .set_booking_status(&input.booking.booking_id, BookingStatus::FeedbackComplete)?;
        warehouse::mirror(ctx.warehouse.as_ref(), collections::FEEDBACK_CASES, &feedback);

        let message = json!({
            "feedback_id": feedback.feedback_id,
            "booking_id": feedback.booking_id,
            "case_id": feedback.case_id,
            "vehicle_id": feedback.vehicle_id,
            "cei_score": feedback.cei_score,
            "validation_label": feedback.validation_label,
            "recommended_retrain": feedback.recommended_retrain,
            "agent_stage": Stage::Feedback,
        });
        publish_json(ctx.bus.as_ref(), topics::FEEDBACK_COMPLETE, &message).await?;

        Ok(WorkerOutcome::Committed {
            id: feedback.feedback_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_with(raw: &str) -> FeedbackVerdict {
        let stage = FeedbackStage;
        let envelope =
            Envelope::decode(br#"{"booking_id":"booking_1","vehicle_id":"V1"}"#).unwrap();
        let subject = Subject::new("V1".to_string(), envelope);
        let input = FeedbackInput {
            booking: Booking {
                booking_id: "booking_1".to_string(),
                case_id: "case_1".to_string(),
                vehicle_id: "V1".to_string(),
                service_center: "sc_mumbai_01".to_string(),
                scheduled_slot: "2025-06-02T10:00:00Z".to_string(),
                status: BookingStatus::Confirmed,
                created_at: None,
            },
            case: AnomalyCase {
                case_id: "case_1".to_string(),
                vehicle_id: "V1".to_string(),
                anomaly_detected: true,
                anomaly_type: Some(crate::types::AnomalyType::ThermalOverheat),
                severity_score: Some(0.75),
                telemetry_event_ids: vec![],
                status: crate::types::CaseStatus::Completed,
                created_at: None,
            },
            post_service_window: vec![],
            technician_notes: None,
            customer_rating: None,
        };
        stage.parse(&subject, &input, raw).unwrap()
    }

    #[test]
    fn retrain_flag_follows_label() {
        // Model contradicts itself: Recurring but retrain=false.
        let verdict = parse_with(
            r#"{"cei_score": 2.5, "validation_label": "Recurring", "recommended_retrain": false}"#,
        );
        assert_eq!(verdict.validation_label, ValidationLabel::Recurring);
        assert!(verdict.recommended_retrain);

        let verdict = parse_with(
            r#"{"cei_score": 4.8, "validation_label": "Correct", "recommended_retrain": true}"#,
        );
        assert!(!verdict.recommended_retrain);
    }

    #[test]
    fn cei_is_clamped_to_band() {
        let verdict = parse_with(r#"{"cei_score": 9.0, "validation_label": "Correct"}"#);
        assert!((verdict.cei_score - 5.0).abs() < f64::EPSILON);
        let verdict = parse_with(r#"{"cei_score": 0.0, "validation_label": "Correct"}"#);
        assert!((verdict.cei_score - 1.0).abs() < f64::EPSILON);
    }
}

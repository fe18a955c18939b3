//! Orchestrator — confidence-gated routing between stages.
//!
//! Purely logical, no model calls. Subscribes to every completion topic,
//! infers the producing stage from the `agent_stage` tag (falling back
//! to key-structure heuristics), resolves a confidence score, gates the
//! critical stages against the configured threshold, and either
//! republishes the envelope on the successor's input topic or parks the
//! case in human review. Pipeline state is written after every decision.
//!
//! The orchestrator never mutates stage records; it only writes
//! pipeline-state and human-review documents. It never retries
//! internally — a failed publish or review write is fatal to the
//! invocation and redelivery is safe.

use serde_json::Value;
use tracing::{info, warn};

use super::worker::StageContext;
use crate::bus::{envelope::Envelope, publish_json, topics};
use crate::error::PipelineError;
use crate::store::collections;
use crate::store::warehouse;
use crate::types::{HumanReview, PipelineState, ReviewStatus, Stage};

/// Pseudo-stage names written to pipeline state.
const NEXT_HUMAN_REVIEW: &str = "human_review";
const NEXT_COMPLETED: &str = "completed";

/// Outcome of one routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Republished on the successor's input topic.
    Routed { from: Stage, to: Stage, case_id: String },
    /// Confidence below threshold on a critical stage.
    HumanReview { stage: Stage, case_id: String },
    /// The stage is terminal on its path.
    Terminal { stage: Stage, case_id: String },
}

/// Producing stage, from the tag or from the key structure. Checked
/// most-specific key first: downstream envelopes carry their upstream
/// correlators too.
pub fn infer_stage(envelope: &Envelope) -> Option<Stage> {
    if let Some(tag) = envelope.get_str("agent_stage") {
        if let Some(stage) = Stage::parse(&tag) {
            return Some(stage);
        }
    }
    let has = |key: &str| envelope.fields().contains_key(key);
    if has("manufacturing_id") {
        Some(Stage::Manufacturing)
    } else if has("feedback_id") {
        Some(Stage::Feedback)
    } else if has("communication_id") {
        Some(Stage::Communication)
    } else if has("engagement_id") {
        Some(Stage::Engagement)
    } else if has("scheduling_id") {
        Some(Stage::Scheduling)
    } else if has("rca_id") {
        Some(Stage::Rca)
    } else if has("diagnosis_id") {
        Some(Stage::Diagnosis)
    } else if has("case_id") && has("anomaly_type") {
        Some(Stage::DataAnalysis)
    } else {
        None
    }
}

/// Input topic of each routable successor stage.
fn input_topic(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::Diagnosis => Some(topics::DIAGNOSIS_INPUT),
        Stage::Rca => Some(topics::RCA_INPUT),
        Stage::Scheduling => Some(topics::SCHEDULING_INPUT),
        Stage::Engagement => Some(topics::ENGAGEMENT_INPUT),
        Stage::Manufacturing => Some(topics::MANUFACTURING_INPUT),
        Stage::DataAnalysis | Stage::Communication | Stage::Feedback => None,
    }
}

pub struct Orchestrator;

impl Orchestrator {
    /// Resolve confidence from the envelope or, failing that, from the
    /// producing case record. Stages whose records define no confidence
    /// field are assumed at 0.90.
    async fn resolve_confidence(
        ctx: &StageContext,
        stage: Stage,
        envelope: &Envelope,
    ) -> Result<f64, PipelineError> {
        if let Some(confidence) = envelope.get_f64("confidence") {
            return Ok(confidence);
        }
        let resolved = match stage {
            Stage::DataAnalysis => match envelope.get_f64("severity_score") {
                // Inverted on purpose: higher severity, lower routing
                // confidence. Carried as-is from the anomaly stage.
                Some(severity) => Some(1.0 - severity),
                None => match envelope.get_str("case_id") {
                    Some(case_id) => ctx
                        .store
                        .get_anomaly_case(&case_id)?
                        .map(|case| case.routing_confidence()),
                    None => None,
                },
            },
            Stage::Rca => match envelope.get_str("rca_id") {
                Some(rca_id) => ctx.store.get_rca(&rca_id)?.map(|rca| rca.confidence),
                None => None,
            },
            Stage::Diagnosis
            | Stage::Scheduling
            | Stage::Engagement
            | Stage::Communication
            | Stage::Feedback
            | Stage::Manufacturing => Some(0.90),
        };
        Ok(resolved.unwrap_or_else(|| {
            warn!(stage = %stage, "No confidence found, assuming threshold");
            ctx.config.confidence_threshold
        }))
    }

    fn update_pipeline_state(
        ctx: &StageContext,
        case_id: &str,
        current: Stage,
        next: &str,
        confidence: f64,
    ) -> Result<(), PipelineError> {
        let state = PipelineState {
            case_id: case_id.to_string(),
            current_stage: current,
            next_stage: next.to_string(),
            confidence: Some(confidence),
            updated_at: None,
        };
        ctx.store.upsert_pipeline_state(state.clone())?;
        warehouse::mirror(ctx.warehouse.as_ref(), collections::PIPELINE_STATES, &state);
        Ok(())
    }

    pub async fn handle(
        &self,
        ctx: &StageContext,
        payload: &[u8],
    ) -> Result<RoutingDecision, PipelineError> {
        let envelope = Envelope::decode(payload)?;
        let Some(stage) = infer_stage(&envelope) else {
            return Err(PipelineError::MalformedEnvelope(format!(
                "cannot determine producing stage from keys {:?}",
                envelope.fields().keys().collect::<Vec<_>>()
            )));
        };
        let case_id = envelope.require_str("case_id")?;
        let confidence = Self::resolve_confidence(ctx, stage, &envelope).await?;

        // Gate only the critical stages; downstream stages pass through.
        if stage.is_confidence_gated() && confidence < ctx.config.confidence_threshold {
            let review_id = format!("{case_id}_{stage}");
            let review = HumanReview {
                review_id: review_id.clone(),
                case_id: case_id.clone(),
                vehicle_id: envelope.get_str("vehicle_id"),
                agent_stage: stage,
                confidence,
                review_status: ReviewStatus::Pending,
                message_data: envelope.clone().into_value(),
                created_at: None,
            };
            // A review write failure is fatal: losing the flag would
            // silently drop a low-confidence case.
            ctx.store.insert_human_review(review)?;
            Self::update_pipeline_state(ctx, &case_id, stage, NEXT_HUMAN_REVIEW, confidence)?;
            info!(
                case_id = %case_id,
                stage = %stage,
                confidence,
                threshold = ctx.config.confidence_threshold,
                "Routed to human review"
            );
            return Ok(RoutingDecision::HumanReview { stage, case_id });
        }

        let Some(next) = stage.successor() else {
            Self::update_pipeline_state(ctx, &case_id, stage, NEXT_COMPLETED, confidence)?;
            info!(case_id = %case_id, stage = %stage, "Pipeline path complete");
            return Ok(RoutingDecision::Terminal { stage, case_id });
        };
        let Some(topic) = input_topic(next) else {
            Self::update_pipeline_state(ctx, &case_id, stage, NEXT_COMPLETED, confidence)?;
            return Ok(RoutingDecision::Terminal { stage, case_id });
        };

        // Copy the envelope and stamp the successor before republishing.
        let mut routed = envelope.into_value();
        if let Value::Object(fields) = &mut routed {
            fields.insert(
                "agent_stage".to_string(),
                Value::String(next.as_str().to_string()),
            );
        }
        publish_json(ctx.bus.as_ref(), topic, &routed).await?;
        Self::update_pipeline_state(ctx, &case_id, stage, next.as_str(), confidence)?;
        info!(case_id = %case_id, from = %stage, to = %next, confidence, "Routed to next stage");

        Ok(RoutingDecision::Routed {
            from: stage,
            to: next,
            case_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: serde_json::Value) -> Envelope {
        Envelope::decode(&serde_json::to_vec(&value).unwrap()).unwrap()
    }

    #[test]
    fn stage_tag_wins() {
        let env = envelope(json!({"agent_stage": "rca", "diagnosis_id": "d", "case_id": "c"}));
        assert_eq!(infer_stage(&env), Some(Stage::Rca));
    }

    #[test]
    fn heuristics_check_most_specific_key_first() {
        // An RCA completion also carries diagnosis_id; rca_id must win.
        let env = envelope(json!({"rca_id": "r", "diagnosis_id": "d", "case_id": "c"}));
        assert_eq!(infer_stage(&env), Some(Stage::Rca));

        let env = envelope(json!({"diagnosis_id": "d", "case_id": "c"}));
        assert_eq!(infer_stage(&env), Some(Stage::Diagnosis));

        let env = envelope(json!({"case_id": "c", "anomaly_type": "thermal_overheat"}));
        assert_eq!(infer_stage(&env), Some(Stage::DataAnalysis));

        let env = envelope(json!({"case_id": "c"}));
        assert_eq!(infer_stage(&env), None);
    }

    #[test]
    fn unknown_tag_falls_back_to_keys() {
        let env = envelope(json!({"agent_stage": "mystery", "scheduling_id": "s", "case_id": "c"}));
        assert_eq!(infer_stage(&env), Some(Stage::Scheduling));
    }

    #[test]
    fn input_topics_cover_routable_stages() {
        for stage in [Stage::DataAnalysis, Stage::Diagnosis, Stage::Rca, Stage::Scheduling, Stage::Feedback] {
            let next = stage.successor().unwrap();
            assert!(input_topic(next).is_some(), "no input topic for {next}");
        }
    }
}

//! Engagement stage.
//!
//! Consumes routed scheduling completions, simulates the customer
//! dialogue, and mints a booking when the customer confirms. Always
//! publishes `engagement-complete`; when the vehicle has a phone number
//! it additionally publishes `communication-trigger` so the live
//! telephony stage can attempt an actual call.

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
    mint_id, Booking, BookingStatus, CustomerDecision, DialogueTurn, EngagementCase,
    EngagementStatus, RcaCase, SchedulingCase, SchedulingStatus, Stage, Vehicle,
};

pub struct EngagementInput {
    pub scheduling: SchedulingCase,
    pub rca: Option<RcaCase>,
    pub vehicle: Option<Vehicle>,
}

#[derive(Debug, Clone)]
pub struct EngagementVerdict {
    pub customer_decision: CustomerDecision,
    pub transcript: Vec<DialogueTurn>,
}

/// Accept a structured turn list, or split a `Speaker: text` flat string
/// into one.
fn parse_transcript(value: Option<&serde_json::Value>) -> Vec<DialogueTurn> {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let speaker = item.get("speaker")?.as_str()?;
                let text = item.get("text")?.as_str()?;
                let speaker = if speaker.eq_ignore_ascii_case("customer") {
                    "customer"
                } else {
                    "agent"
                };
                Some(DialogueTurn {
                    speaker: speaker.to_string(),
                    text: text.to_string(),
                })
            })
            .collect(),
        Some(serde_json::Value::String(flat)) => flat
            .lines()
            .filter_map(|line| {
                let (speaker, text) = line.split_once(':')?;
                let speaker = if speaker.trim().eq_ignore_ascii_case("customer") {
                    "customer"
                } else {
                    "agent"
                };
                Some(DialogueTurn {
                    speaker: speaker.to_string(),
                    text: text.trim().to_string(),
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub struct EngagementStage;

#[async_trait]
impl AiStage for EngagementStage {
    type Input = EngagementInput;
    type Output = EngagementVerdict;

    fn stage(&self) -> Stage {
        Stage::Engagement
    }

    fn subject(&self, envelope: &Envelope) -> Result<Subject, PipelineError> {
        envelope.require_str("scheduling_id")?;
        envelope.require_str("case_id")?;
        let vehicle_id = envelope.require_str("vehicle_id")?;
        Ok(Subject::new(vehicle_id, envelope.clone()))
    }

    async fn probe(
        &self,
        ctx: &StageContext,
        subject: &Subject,
    ) -> Result<DuplicateState, PipelineError> {
        let scheduling_id = subject.envelope.require_str("scheduling_id")?;
        match ctx.store.engagement_for_scheduling(&scheduling_id)? {
            Some(existing) => Ok(DuplicateState::from_existing(
                existing.engagement_id,
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
        let scheduling_id = subject.envelope.require_str("scheduling_id")?;
        let Some(scheduling) = ctx.store.get_scheduling(&scheduling_id)? else {
            return Ok(Assembled::Skip {
                reason: format!("scheduling {scheduling_id} not found"),
            });
        };
        if scheduling.status != SchedulingStatus::PendingEngagement {
            return Ok(Assembled::Skip {
                reason: format!("scheduling {scheduling_id} already {:?}", scheduling.status),
            });
        }
        let rca = ctx.store.get_rca(&scheduling.rca_id)?;
        let vehicle = ctx.store.get_vehicle(&scheduling.vehicle_id)?;
        Ok(Assembled::Ready(EngagementInput {
            scheduling,
            rca,
            vehicle,
        }))
    }

    fn build_prompt(&self, _subject: &Subject, input: &Self::Input) -> String {
        prompts::engagement_prompt(&input.scheduling, input.rca.as_ref(), input.vehicle.as_ref())
    }

    fn parse(
        &self,
        _subject: &Subject,
        _input: &Self::Input,
        raw: &str,
    ) -> Result<Self::Output, PipelineError> {
        let value = extract_json(raw)?;
        let customer_decision = value
            .get("customer_decision")
            .and_then(serde_json::Value::as_str)
            .and_then(CustomerDecision::parse)
            .unwrap_or(CustomerDecision::NoResponse);
        let transcript = parse_transcript(value.get("transcript"));
        Ok(EngagementVerdict {
            customer_decision,
            transcript,
        })
    }

    async fn commit(
        &self,
        ctx: &StageContext,
        _subject: &Subject,
        input: Self::Input,
        output: Self::Output,
    ) -> Result<WorkerOutcome, PipelineError> {
        // Invariant: a booking exists exactly when the customer confirmed.
        let booking_id = match output.customer_decision {
            CustomerDecision::Confirmed => Some(mint_id("booking")),
            CustomerDecision::Declined | CustomerDecision::NoResponse => None,
        };
        let customer_phone = input.vehicle.as_ref().and_then(|v| v.owner_phone.clone());
        let customer_name = input.vehicle.as_ref().and_then(|v| v.owner_name.clone());

        let engagement = EngagementCase {
            engagement_id: mint_id("engagement"),
            scheduling_id: input.scheduling.scheduling_id.clone(),
            rca_id: input.scheduling.rca_id.clone(),
            case_id: input.scheduling.case_id.clone(),
            vehicle_id: input.scheduling.vehicle_id.clone(),
            customer_phone: customer_phone.clone(),
            customer_name: customer_name.clone(),
            customer_decision: output.customer_decision,
            booking_id: booking_id.clone(),
            transcript: output.transcript,
            status: EngagementStatus::Completed,
            created_at: None,
        };
        let engagement = ctx.store.insert_engagement(engagement)?;
        ctx.store.set_scheduling_status(
            &input.scheduling.scheduling_id,
            SchedulingStatus::EngagementComplete,
        )?;
        warehouse::mirror(
            ctx.warehouse.as_ref(),
            collections::ENGAGEMENT_CASES,
            &engagement,
        );

        if let Some(booking_id) = &booking_id {
            let booking = Booking {
                booking_id: booking_id.clone(),
                case_id: input.scheduling.case_id.clone(),
                vehicle_id: input.scheduling.vehicle_id.clone(),
                service_center: input.scheduling.service_center.clone(),
                scheduled_slot: input.scheduling.best_slot.clone(),
                status: BookingStatus::Confirmed,
                created_at: None,
            };
            let booking = ctx.store.insert_booking(booking)?;
            warehouse::mirror(ctx.warehouse.as_ref(), collections::BOOKINGS, &booking);
        }

        let message = json!({
            "engagement_id": engagement.engagement_id,
            "case_id": engagement.case_id,
            "vehicle_id": engagement.vehicle_id,
            "customer_decision": engagement.customer_decision,
            "booking_id": engagement.booking_id,
            "confidence": 0.90,
            "agent_stage": Stage::Engagement,
        });
        publish_json(ctx.bus.as_ref(), topics::ENGAGEMENT_COMPLETE, &message).await?;

        // Live-call fan-out needs a reachable customer.
        if let Some(phone) = customer_phone {
            let trigger = json!({
                "engagement_id": engagement.engagement_id,
                "case_id": engagement.case_id,
                "vehicle_id": engagement.vehicle_id,
                "customer_phone": phone,
                "customer_name": customer_name,
            });
            publish_json(ctx.bus.as_ref(), topics::COMMUNICATION_TRIGGER, &trigger).await?;
        }

        Ok(WorkerOutcome::Committed {
            id: engagement.engagement_id,
        })
    }
}

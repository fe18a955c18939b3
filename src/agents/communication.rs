//! Communication stage — live telephony.
//!
//! Consumes `communication-trigger` fan-outs from engagement. Unlike the
//! AI stages this worker makes no model call, so it has no jitter sleep
//! and no backoff; it keeps the engagement-keyed duplicate gates and
//! re-checks right before writing. The webhook component drives the
//! dialog once the provider connects the call.

use std::sync::Arc;

use tracing::{info, warn};

use super::worker::{DuplicateState, StageContext};
use crate::bus::envelope::Envelope;
use crate::error::{PipelineError, WorkerOutcome};
use crate::store::collections;
use crate::store::warehouse;
use crate::telephony::{normalize_e164, TelephonyProvider};
use crate::types::{
    mint_id, CallContext, CallStatus, CommunicationCase, ConversationStage, Stage,
};

pub struct CommunicationWorker {
    provider: Arc<dyn TelephonyProvider>,
}

impl CommunicationWorker {
    pub fn new(provider: Arc<dyn TelephonyProvider>) -> Self {
        Self { provider }
    }

    async fn probe(
        &self,
        ctx: &StageContext,
        engagement_id: &str,
    ) -> Result<DuplicateState, PipelineError> {
        match ctx.store.communication_for_engagement(engagement_id)? {
            Some(existing) => Ok(DuplicateState::from_existing(
                existing.communication_id,
                existing.created_at,
                ctx.config.duplicate_window(),
            )),
            None => Ok(DuplicateState::Absent),
        }
    }

    pub async fn handle(
        &self,
        ctx: &StageContext,
        payload: &[u8],
    ) -> Result<WorkerOutcome, PipelineError> {
        let envelope = Envelope::decode(payload)?;
        let engagement_id = envelope.require_str("engagement_id")?;
        let vehicle_id = envelope.require_str("vehicle_id")?;

        let gate = self.probe(ctx, &engagement_id).await?;
        if gate.suppresses() {
            info!(stage = %Stage::Communication, engagement_id = %engagement_id, state = ?gate, "Duplicate trigger suppressed");
            return Ok(WorkerOutcome::skipped("duplicate communication trigger", None));
        }

        let Some(engagement) = ctx.store.get_engagement(&engagement_id)? else {
            info!(engagement_id = %engagement_id, "Engagement not found, skipping call");
            return Ok(WorkerOutcome::skipped("engagement not found", None));
        };
        let phone = envelope
            .get_str("customer_phone")
            .or_else(|| engagement.customer_phone.clone());
        let Some(phone) = phone else {
            info!(engagement_id = %engagement_id, "No customer phone, skipping call");
            return Ok(WorkerOutcome::skipped("customer phone not available", None));
        };
        let customer_phone = normalize_e164(&phone, &ctx.config.default_country_code);
        let customer_name = envelope
            .get_str("customer_name")
            .or_else(|| engagement.customer_name.clone());

        // Final re-check before the write; no jitter window here, but
        // another instance can have committed since gate A.
        let gate = self.probe(ctx, &engagement_id).await?;
        if gate.suppresses() {
            info!(engagement_id = %engagement_id, state = ?gate, "Duplicate detected before commit");
            return Ok(WorkerOutcome::skipped("duplicate communication trigger", None));
        }

        let case = CommunicationCase {
            communication_id: mint_id("comm"),
            engagement_id: engagement.engagement_id.clone(),
            case_id: engagement.case_id.clone(),
            vehicle_id: vehicle_id.clone(),
            customer_phone: customer_phone.clone(),
            customer_name: customer_name.clone(),
            call_status: CallStatus::Initiating,
            conversation_stage: ConversationStage::Pending,
            conversation_transcript: Vec::new(),
            outcome: None,
            booking_id: engagement.booking_id.clone(),
            call_sid: None,
            created_at: None,
            updated_at: None,
        };
        let case = ctx.store.insert_communication(case)?;

        let voice_url = format!("{}/webhook/voice", ctx.config.telephony.webhook_base_url);
        let call = self
            .provider
            .create_call(&customer_phone, &ctx.config.telephony.caller_number, &voice_url)
            .await;

        match call {
            Ok(call_sid) => {
                let updated = ctx.store.update_communication(&case.communication_id, |c| {
                    c.call_sid = Some(call_sid.clone());
                    c.call_status = CallStatus::Initiated;
                })?;
                let best_slot = ctx
                    .store
                    .get_scheduling(&engagement.scheduling_id)?
                    .map(|s| s.best_slot);
                ctx.store.insert_call_context(CallContext {
                    call_sid: call_sid.clone(),
                    communication_id: case.communication_id.clone(),
                    engagement_id: engagement.engagement_id.clone(),
                    case_id: engagement.case_id.clone(),
                    vehicle_id,
                    customer_phone,
                    customer_name,
                    booking_id: engagement.booking_id.clone(),
                    best_slot,
                    created_at: None,
                })?;
                warehouse::mirror(
                    ctx.warehouse.as_ref(),
                    collections::COMMUNICATION_CASES,
                    &updated,
                );
                info!(
                    communication_id = %case.communication_id,
                    call_sid = %call_sid,
                    "Outbound call initiated"
                );
            }
            Err(e) => {
                // The case records the failure; redelivery will be
                // absorbed by the gates rather than redialing.
                let updated = ctx.store.update_communication(&case.communication_id, |c| {
                    c.call_status = CallStatus::Failed;
                })?;
                warehouse::mirror(
                    ctx.warehouse.as_ref(),
                    collections::COMMUNICATION_CASES,
                    &updated,
                );
                warn!(
                    communication_id = %case.communication_id,
                    error = %e,
                    "Outbound call failed"
                );
            }
        }

        Ok(WorkerOutcome::Committed {
            id: case.communication_id,
        })
    }
}

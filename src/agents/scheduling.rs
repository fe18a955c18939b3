//! Scheduling stage.
//!
//! Consumes routed RCA completions, selects a service center with parts
//! and capacity, synthesizes availability from operating hours when the
//! center record carries no explicit slot list, subtracts slots taken by
//! confirmed or pending bookings, and picks the best slot plus at least
//! two fallbacks. The slot urgency band follows the diagnosis RUL.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use super::prompts;
use super::slots;
use super::worker::{AiStage, Assembled, DuplicateState, StageContext, Subject};
use crate::bus::{envelope::Envelope, publish_json, topics};
use crate::error::{PipelineError, WorkerOutcome};
use crate::model::extract_json;
use crate::store::collections;
use crate::store::warehouse;
use crate::types::{
    mint_id, BookingStatus, DiagnosisCase, RcaCase, RcaStatus, SchedulingCase, SchedulingStatus,
    ServiceCenter, SlotType, Stage,
};

pub struct SchedulingInput {
    pub rca: RcaCase,
    pub diagnosis: DiagnosisCase,
    pub center: ServiceCenter,
    /// Open slots at the center: synthesized or listed, minus booked.
    pub available_slots: Vec<String>,
    pub spare_parts: BTreeMap<String, String>,
    pub technician_availability: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SchedulingVerdict {
    pub best_slot: String,
    pub slot_type: SlotType,
    pub fallback_slots: Vec<String>,
}

pub struct SchedulingStage;

/// First center with remaining capacity, in registry order; the loop is
/// bounded by the registry size. Location-based selection is an
/// extension point — the reference policy ignores proximity.
fn select_center(
    ctx: &StageContext,
    centers: &[ServiceCenter],
) -> Result<Option<(ServiceCenter, Vec<String>)>, PipelineError> {
    for center in centers {
        let bookings = ctx.store.bookings_for_center(&center.service_center_id)?;
        let taken: Vec<String> = bookings
            .iter()
            .filter(|b| matches!(b.status, BookingStatus::Confirmed | BookingStatus::Pending))
            .map(|b| b.scheduled_slot.clone())
            .collect();
        if taken.len() < center.capacity as usize {
            return Ok(Some((center.clone(), taken)));
        }
    }
    Ok(None)
}

/// Round-robin the open slots across the center's technicians; synthetic
/// names fill in when the record lists none.
fn distribute_to_technicians(
    center: &ServiceCenter,
    available: &[String],
) -> BTreeMap<String, Vec<String>> {
    let technicians: Vec<String> = if center.technicians.is_empty() {
        let count = (available.len() / 5).clamp(1, 3);
        (1..=count).map(|i| format!("tech_{i}")).collect()
    } else {
        center.technicians.clone()
    };

    let mut assignment: BTreeMap<String, Vec<String>> = technicians
        .iter()
        .map(|t| (t.clone(), Vec::new()))
        .collect();
    for (i, slot) in available.iter().enumerate() {
        let tech = &technicians[i % technicians.len()];
        if let Some(list) = assignment.get_mut(tech) {
            list.push(slot.clone());
        }
    }
    assignment
}

#[async_trait]
impl AiStage for SchedulingStage {
    type Input = SchedulingInput;
    type Output = SchedulingVerdict;

    fn stage(&self) -> Stage {
        Stage::Scheduling
    }

    fn subject(&self, envelope: &Envelope) -> Result<Subject, PipelineError> {
        envelope.require_str("rca_id")?;
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
        let rca_id = subject.envelope.require_str("rca_id")?;
        match ctx.store.scheduling_for_rca(&rca_id)? {
            Some(existing) => Ok(DuplicateState::from_existing(
                existing.scheduling_id,
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
        let rca_id = subject.envelope.require_str("rca_id")?;
        let Some(rca) = ctx.store.get_rca(&rca_id)? else {
            return Ok(Assembled::Skip {
                reason: format!("rca {rca_id} not found"),
            });
        };
        if rca.status.rank() >= RcaStatus::Scheduled.rank() {
            return Ok(Assembled::Skip {
                reason: format!("rca {rca_id} already {:?}", rca.status),
            });
        }
        let Some(diagnosis) = ctx.store.get_diagnosis(&rca.diagnosis_id)? else {
            return Ok(Assembled::Skip {
                reason: format!("diagnosis {} not found", rca.diagnosis_id),
            });
        };

        let centers = ctx.store.service_centers()?;
        if centers.is_empty() {
            return Ok(Assembled::Skip {
                reason: "no service centers registered".to_string(),
            });
        }
        // All centers full: stay with the first and let the longer
        // horizon below surface whatever is left.
        let (center, taken) = match select_center(ctx, &centers)? {
            Some(selection) => selection,
            None => {
                let first = centers[0].clone();
                let bookings = ctx.store.bookings_for_center(&first.service_center_id)?;
                let taken = bookings
                    .iter()
                    .filter(|b| {
                        matches!(b.status, BookingStatus::Confirmed | BookingStatus::Pending)
                    })
                    .map(|b| b.scheduled_slot.clone())
                    .collect();
                (first, taken)
            }
        };

        let now = Utc::now();
        let taken: HashSet<String> = taken.into_iter().collect();
        let raw = if center.available_slots.is_empty() {
            slots::expand_operating_hours(&center.operating_hours, &center.timezone, now, 30)
        } else {
            center.available_slots.clone()
        };
        let mut available: Vec<String> = raw.into_iter().filter(|s| !taken.contains(s)).collect();
        if available.len() < 3 {
            // Widen the horizon rather than fail: a best slot and two
            // fallbacks must always exist.
            available =
                slots::expand_operating_hours(&center.operating_hours, &center.timezone, now, 60)
                    .into_iter()
                    .filter(|s| !taken.contains(s))
                    .take(20)
                    .collect();
        }
        if available.is_empty() {
            return Ok(Assembled::Skip {
                reason: format!("no open slots at {}", center.service_center_id),
            });
        }

        let mut spare_parts = center.spare_parts_availability.clone();
        spare_parts
            .entry(diagnosis.component.clone())
            .or_insert_with(|| "available".to_string());
        let technician_availability = distribute_to_technicians(&center, &available);

        Ok(Assembled::Ready(SchedulingInput {
            rca,
            diagnosis,
            center,
            available_slots: available,
            spare_parts,
            technician_availability,
        }))
    }

    fn build_prompt(&self, _subject: &Subject, input: &Self::Input) -> String {
        prompts::scheduling_prompt(
            &input.diagnosis,
            &input.center.service_center_id,
            &input.available_slots,
            &input.spare_parts,
            &input.technician_availability,
        )
    }

    fn parse(
        &self,
        _subject: &Subject,
        input: &Self::Input,
        raw: &str,
    ) -> Result<Self::Output, PipelineError> {
        let value = extract_json(raw)?;

        // The chosen slot must be one the center can actually take.
        let best_slot = value
            .get("best_slot")
            .and_then(serde_json::Value::as_str)
            .filter(|s| input.available_slots.iter().any(|a| a == s))
            .map(str::to_string)
            .unwrap_or_else(|| input.available_slots[0].clone());

        let mut fallback_slots: Vec<String> = value
            .get("fallback_slots")
            .and_then(serde_json::Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(serde_json::Value::as_str)
                    .filter(|s| *s != best_slot)
                    .filter(|s| input.available_slots.iter().any(|a| a == s))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        fallback_slots.dedup();
        // Backfill to the contractual minimum of two.
        for slot in &input.available_slots {
            if fallback_slots.len() >= 2 {
                break;
            }
            if slot != &best_slot && !fallback_slots.contains(slot) {
                fallback_slots.push(slot.clone());
            }
        }

        Ok(SchedulingVerdict {
            best_slot,
            // Invariant: the urgency band follows the diagnosis RUL.
            slot_type: SlotType::from_rul_days(input.diagnosis.estimated_rul_days),
            fallback_slots,
        })
    }

    async fn commit(
        &self,
        ctx: &StageContext,
        _subject: &Subject,
        input: Self::Input,
        output: Self::Output,
    ) -> Result<WorkerOutcome, PipelineError> {
        let scheduling = SchedulingCase {
            scheduling_id: mint_id("scheduling"),
            rca_id: input.rca.rca_id.clone(),
            diagnosis_id: input.rca.diagnosis_id.clone(),
            case_id: input.rca.case_id.clone(),
            vehicle_id: input.rca.vehicle_id.clone(),
            best_slot: output.best_slot,
            service_center: input.center.service_center_id.clone(),
            slot_type: output.slot_type,
            fallback_slots: output.fallback_slots,
            status: SchedulingStatus::PendingEngagement,
            created_at: None,
        };
        let scheduling = ctx.store.insert_scheduling(scheduling)?;
        ctx.store
            .set_rca_status(&input.rca.rca_id, RcaStatus::Scheduled)?;
        warehouse::mirror(
            ctx.warehouse.as_ref(),
            collections::SCHEDULING_CASES,
            &scheduling,
        );

        let message = json!({
            "scheduling_id": scheduling.scheduling_id,
            "rca_id": scheduling.rca_id,
            "diagnosis_id": scheduling.diagnosis_id,
            "case_id": scheduling.case_id,
            "vehicle_id": scheduling.vehicle_id,
            "best_slot": scheduling.best_slot,
            "service_center": scheduling.service_center,
            "slot_type": scheduling.slot_type,
            "fallback_slots": scheduling.fallback_slots,
        });
        publish_json(ctx.bus.as_ref(), topics::SCHEDULING_COMPLETE, &message).await?;

        Ok(WorkerOutcome::Committed {
            id: scheduling.scheduling_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CapaType, DiagnosisStatus, Severity};

    fn center_with_slots(available: Vec<String>) -> ServiceCenter {
        ServiceCenter {
            service_center_id: "sc_mumbai_01".to_string(),
            name: None,
            timezone: "UTC".to_string(),
            capacity: 10,
            operating_hours: BTreeMap::new(),
            available_slots: available,
            spare_parts_availability: BTreeMap::new(),
            technicians: vec!["tech_a".to_string(), "tech_b".to_string()],
        }
    }

    fn sample_input(available: Vec<String>, rul_days: u32) -> SchedulingInput {
        let center = center_with_slots(available.clone());
        SchedulingInput {
            rca: RcaCase {
                rca_id: "rca_1".to_string(),
                diagnosis_id: "diagnosis_1".to_string(),
                case_id: "case_1".to_string(),
                vehicle_id: "V1".to_string(),
                root_cause: "pump wear".to_string(),
                confidence: 0.9,
                recommended_action: "replace pump".to_string(),
                capa_type: CapaType::Corrective,
                status: RcaStatus::PendingScheduling,
                created_at: None,
            },
            diagnosis: DiagnosisCase {
                diagnosis_id: "diagnosis_1".to_string(),
                case_id: "case_1".to_string(),
                vehicle_id: "V1".to_string(),
                component: "engine_coolant_system".to_string(),
                failure_probability: 0.8,
                estimated_rul_days: rul_days,
                severity: Severity::High,
                context_event_ids: vec![],
                status: DiagnosisStatus::RcaComplete,
                created_at: None,
            },
            technician_availability: distribute_to_technicians(&center, &available),
            spare_parts: BTreeMap::new(),
            center,
            available_slots: available,
        }
    }

    fn slots_fixture() -> Vec<String> {
        vec![
            "2025-06-02T09:00:00Z".to_string(),
            "2025-06-02T10:00:00Z".to_string(),
            "2025-06-02T11:00:00Z".to_string(),
            "2025-06-03T09:00:00Z".to_string(),
        ]
    }

    #[test]
    fn parse_forces_slot_type_from_rul() {
        let stage = SchedulingStage;
        let envelope = Envelope::decode(
            br#"{"rca_id":"rca_1","diagnosis_id":"diagnosis_1","case_id":"case_1","vehicle_id":"V1"}"#,
        )
        .unwrap();
        let subject = Subject::new("V1".to_string(), envelope);
        let input = sample_input(slots_fixture(), 15);
        let verdict = stage
            .parse(
                &subject,
                &input,
                r#"{"best_slot": "2025-06-02T10:00:00Z", "service_center": "sc_other", "slot_type": "urgent", "fallback_slots": ["2025-06-02T11:00:00Z", "2025-06-03T09:00:00Z"]}"#,
            )
            .unwrap();
        // RUL 15 days is the normal band regardless of what the model said.
        assert_eq!(verdict.slot_type, SlotType::Normal);
        assert_eq!(verdict.best_slot, "2025-06-02T10:00:00Z");
        assert_eq!(verdict.fallback_slots.len(), 2);
    }

    #[test]
    fn parse_replaces_unavailable_best_slot_and_backfills() {
        let stage = SchedulingStage;
        let envelope = Envelope::decode(
            br#"{"rca_id":"rca_1","diagnosis_id":"diagnosis_1","case_id":"case_1","vehicle_id":"V1"}"#,
        )
        .unwrap();
        let subject = Subject::new("V1".to_string(), envelope);
        let input = sample_input(slots_fixture(), 3);
        let verdict = stage
            .parse(
                &subject,
                &input,
                r#"{"best_slot": "2030-01-01T00:00:00Z", "slot_type": "delayed", "fallback_slots": []}"#,
            )
            .unwrap();
        assert_eq!(verdict.best_slot, "2025-06-02T09:00:00Z");
        assert_eq!(verdict.slot_type, SlotType::Urgent);
        assert!(verdict.fallback_slots.len() >= 2);
        assert!(!verdict.fallback_slots.contains(&verdict.best_slot));
        for slot in &verdict.fallback_slots {
            assert!(input.available_slots.contains(slot));
        }
    }

    #[test]
    fn technician_distribution_covers_all_slots() {
        let center = center_with_slots(slots_fixture());
        let assignment = distribute_to_technicians(&center, &slots_fixture());
        let assigned: usize = assignment.values().map(Vec::len).sum();
        assert_eq!(assigned, 4);
        assert_eq!(assignment.len(), 2);
    }

    #[test]
    fn synthetic_technicians_when_none_listed() {
        let mut center = center_with_slots(slots_fixture());
        center.technicians.clear();
        let assignment = distribute_to_technicians(&center, &slots_fixture());
        assert!(!assignment.is_empty());
        assert!(assignment.keys().all(|k| k.starts_with("tech_")));
    }
}

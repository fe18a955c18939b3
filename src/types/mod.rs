//! Data model for the maintenance pipeline.
//!
//! Every persisted entity lives in a document-store collection keyed by a
//! stage-prefixed opaque ID and carries a server-assigned `created_at`.
//! Cross-entity links are opaque string IDs, never object handles.

mod cases;
mod engagement;
mod registry;
mod stage;
mod telemetry;
pub mod thresholds;

pub use cases::{
    AnomalyCase, AnomalyType, CapaType, CaseStatus, DiagnosisCase, DiagnosisStatus, RcaCase,
    RcaStatus, SchedulingCase, SchedulingStatus, Severity, SlotType,
};
pub use engagement::{
    Booking, BookingStatus, CallOutcome, CallStatus, CommunicationCase, ConversationStage,
    CustomerDecision, DialogueTurn, EngagementCase, EngagementStatus, FeedbackCase,
    ManufacturingCase, ValidationLabel,
};
pub use registry::{CallContext, DayHours, ServiceCenter, Vehicle};
pub use stage::{HumanReview, PipelineState, ReviewStatus, Stage};
pub use telemetry::TelemetryEvent;

/// Stage-prefixed opaque ID: `<prefix>_<10 hex chars>`.
pub fn mint_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_prefixed_and_unique() {
        let a = mint_id("case");
        let b = mint_id("case");
        assert!(a.starts_with("case_"));
        assert_eq!(a.len(), "case_".len() + 10);
        assert_ne!(a, b);
    }
}

//! AURIGA: Predictive Vehicle-Maintenance Pipeline
//!
//! A chain of loosely coupled, event-triggered workers that turn raw
//! telemetry into diagnoses, root-cause analyses, service bookings,
//! customer engagements, feedback evaluations, and manufacturing-quality
//! insights. Workers communicate only through a message bus and a
//! document store.
//!
//! ## Architecture
//!
//! - **Stage workers**: anomaly, diagnosis, RCA, scheduling, engagement,
//!   communication, feedback, manufacturing — each independently
//!   triggered, stateless in itself
//! - **Orchestrator**: confidence-gated routing with a human-review
//!   fallback for the critical stages
//! - **Substrate**: envelope decoding, tri-gate duplicate suppression,
//!   rate-limit backoff against the model backend, warehouse mirroring

pub mod agents;
pub mod api;
pub mod bus;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod telephony;
pub mod types;

// Re-export the substrate surface
pub use agents::worker::{AiStage, DuplicateState, StageContext, Subject};
pub use agents::{Orchestrator, RoutingDecision};
pub use bus::{envelope::Envelope, InProcessBus, MessageBus};
pub use config::PipelineConfig;
pub use error::{PipelineError, WorkerOutcome};
pub use model::{BackoffPolicy, ModelBackend, ModelError};
pub use store::{DocumentStore, StoreError};

// Re-export commonly used record types
pub use types::{
    AnomalyCase, AnomalyType, Booking, CaseStatus, CommunicationCase, DiagnosisCase,
    EngagementCase, FeedbackCase, ManufacturingCase, RcaCase, SchedulingCase, Severity, Stage,
    TelemetryEvent,
};

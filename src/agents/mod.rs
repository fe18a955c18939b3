//! Stage workers.
//!
//! Seven AI-backed stages share the worker skeleton in [`worker`];
//! communication (no model) and the orchestrator (no model, no case
//! writes) are bespoke.

pub mod anomaly;
pub mod communication;
pub mod diagnosis;
pub mod engagement;
pub mod feedback;
pub mod manufacturing;
pub mod orchestrator;
pub mod prompts;
pub mod rca;
pub mod scheduling;
pub mod slots;
pub mod worker;

pub use anomaly::AnomalyStage;
pub use communication::CommunicationWorker;
pub use diagnosis::DiagnosisStage;
pub use engagement::EngagementStage;
pub use feedback::FeedbackStage;
pub use manufacturing::ManufacturingStage;
pub use orchestrator::{Orchestrator, RoutingDecision};
pub use rca::RcaStage;
pub use scheduling::SchedulingStage;
pub use worker::{run_ai_stage, AiStage, DuplicateState, StageContext, Subject};

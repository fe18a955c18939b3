//! Shared stage-worker skeleton.
//!
//! Every AI-backed stage follows the same seven steps: decode the
//! envelope, early duplicate check, fetch prerequisites, assemble the
//! model input, jittered model call (re-checking duplicates after the
//! jitter), parse and normalize, then a final duplicate check before
//! commit + status advance + warehouse mirror + completion publish.
//!
//! Duplicate checks are expressed as explicit states over the probe
//! result rather than threaded through error handling. The window that
//! separates a duplicate from a genuine re-occurrence is the configured
//! duplicate-suppression window.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info};

use crate::bus::envelope::Envelope;
use crate::bus::MessageBus;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, WorkerOutcome};
use crate::model::{self, BackoffPolicy, ModelBackend};
use crate::store::warehouse::WarehouseSink;
use crate::store::DocumentStore;
use crate::types::Stage;

/// Shared dependencies handed to every worker.
#[derive(Clone)]
pub struct StageContext {
    pub store: DocumentStore,
    pub bus: Arc<dyn MessageBus>,
    pub model: Arc<dyn ModelBackend>,
    pub warehouse: Arc<dyn WarehouseSink>,
    pub config: Arc<PipelineConfig>,
}

impl StageContext {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: std::time::Duration::from_secs_f64(self.config.backoff_initial_secs),
            max_attempts: self.config.backoff_max_attempts,
        }
    }

    /// Uniform random sleep spreading concurrent model calls apart.
    pub async fn jitter_sleep(&self) {
        let max = self.config.jitter_max_secs;
        if max > 0.0 {
            let secs = rand::thread_rng().gen_range(0.0..max);
            debug!(jitter_secs = secs, "Jitter delay before model call");
            tokio::time::sleep(std::time::Duration::from_secs_f64(secs)).await;
        }
    }
}

/// Result of a duplicate probe against the downstream collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateState {
    /// No downstream record for this subject.
    Absent,
    /// A record exists inside the suppression window (or still carries
    /// the server sentinel) — a duplicate trigger.
    RecentPending { id: String },
    /// A record exists but is older than the window: a genuine new
    /// occurrence, allowed through.
    OldPending { id: String },
    /// The subject's status is already past this stage.
    Advanced { id: String },
}

impl DuplicateState {
    /// Classify an existing downstream record by age. A sentinel
    /// timestamp means the record committed in this same flush and is
    /// always a duplicate.
    pub fn from_existing(
        id: impl Into<String>,
        created_at: Option<DateTime<Utc>>,
        window: chrono::Duration,
    ) -> Self {
        match created_at {
            None => Self::RecentPending { id: id.into() },
            Some(at) if Utc::now().signed_duration_since(at) < window => {
                Self::RecentPending { id: id.into() }
            }
            Some(_) => Self::OldPending { id: id.into() },
        }
    }

    /// Whether this state suppresses the invocation.
    pub fn suppresses(&self) -> bool {
        matches!(self, Self::RecentPending { .. } | Self::Advanced { .. })
    }

    fn existing_id(&self) -> Option<String> {
        match self {
            Self::Absent => None,
            Self::RecentPending { id } | Self::OldPending { id } | Self::Advanced { id } => {
                Some(id.clone())
            }
        }
    }
}

/// Outcome of prerequisite fetching: either a ready model input or a
/// skip (missing upstream, status advanced — absorbed, not an error).
pub enum Assembled<I> {
    Ready(I),
    Skip { reason: String },
}

/// Stage descriptor: everything that varies between the AI-backed
/// workers. The driver in [`run_ai_stage`] supplies everything that
/// doesn't.
#[async_trait]
pub trait AiStage: Send + Sync {
    /// Prerequisite context plus assembled model input.
    type Input: Send + Sync;
    /// Parsed, normalized stage output.
    type Output: Send + Sync;

    fn stage(&self) -> Stage;

    /// Extract and validate the subject keys from the envelope.
    fn subject(&self, envelope: &Envelope) -> Result<Subject, PipelineError>;

    /// Query the downstream collection by the upstream correlator.
    async fn probe(
        &self,
        ctx: &StageContext,
        subject: &Subject,
    ) -> Result<DuplicateState, PipelineError>;

    /// Fetch the upstream case and assemble the model input.
    async fn assemble(
        &self,
        ctx: &StageContext,
        subject: &Subject,
    ) -> Result<Assembled<Self::Input>, PipelineError>;

    fn build_prompt(&self, subject: &Subject, input: &Self::Input) -> String;

    /// Parse the model response and normalize fields that violate the
    /// stage invariants rather than failing.
    fn parse(
        &self,
        subject: &Subject,
        input: &Self::Input,
        raw: &str,
    ) -> Result<Self::Output, PipelineError>;

    /// Whether committing this output writes anything. A clean anomaly
    /// verdict, for example, has no effect and needs no final gate.
    fn has_effect(&self, _output: &Self::Output) -> bool {
        true
    }

    /// Write the new case, advance the upstream status, mirror to the
    /// warehouse and publish the completion event.
    async fn commit(
        &self,
        ctx: &StageContext,
        subject: &Subject,
        input: Self::Input,
        output: Self::Output,
    ) -> Result<WorkerOutcome, PipelineError>;
}

/// Subject of one invocation: the vehicle plus the decoded envelope the
/// stage's correlators are read from.
#[derive(Debug, Clone)]
pub struct Subject {
    pub vehicle_id: String,
    pub envelope: Envelope,
}

impl Subject {
    pub fn new(vehicle_id: String, envelope: Envelope) -> Self {
        Self {
            vehicle_id,
            envelope,
        }
    }
}

/// Drive one AI-backed stage invocation through the seven-step skeleton.
pub async fn run_ai_stage<S: AiStage>(
    stage: &S,
    ctx: &StageContext,
    payload: &[u8],
) -> Result<WorkerOutcome, PipelineError> {
    let name = stage.stage();

    // 1. Decode envelope. Malformed payloads are fast errors, not retries.
    let envelope = Envelope::decode(payload)?;
    let subject = stage.subject(&envelope)?;

    // 2. Early duplicate check, before any heavy work.
    let gate_a = stage.probe(ctx, &subject).await?;
    if gate_a.suppresses() {
        info!(stage = %name, vehicle_id = %subject.vehicle_id, state = ?gate_a, "Gate A suppressed invocation");
        return Ok(WorkerOutcome::skipped("duplicate at gate A", gate_a.existing_id()));
    }

    // 3–4. Fetch prerequisites and assemble the model input.
    let input = match stage.assemble(ctx, &subject).await? {
        Assembled::Ready(input) => input,
        Assembled::Skip { reason } => {
            info!(stage = %name, vehicle_id = %subject.vehicle_id, reason = %reason, "Skipping invocation");
            return Ok(WorkerOutcome::skipped(reason, None));
        }
    };

    // 5. Jitter, then re-check: two deliveries can land in one window.
    ctx.jitter_sleep().await;
    let gate_b = stage.probe(ctx, &subject).await?;
    if gate_b.suppresses() {
        info!(stage = %name, vehicle_id = %subject.vehicle_id, state = ?gate_b, "Gate B suppressed invocation after jitter");
        return Ok(WorkerOutcome::skipped("duplicate at gate B", gate_b.existing_id()));
    }

    let prompt = stage.build_prompt(&subject, &input);
    let raw = model::generate_with_backoff(ctx.model.as_ref(), &prompt, ctx.backoff_policy()).await?;

    // 6. Parse and normalize.
    let output = stage.parse(&subject, &input, &raw)?;

    // 7. Final duplicate check, then commit + publish.
    if stage.has_effect(&output) {
        let gate_c = stage.probe(ctx, &subject).await?;
        if gate_c.suppresses() {
            info!(stage = %name, vehicle_id = %subject.vehicle_id, state = ?gate_c, "Gate C suppressed commit");
            return Ok(WorkerOutcome::skipped("duplicate at gate C", gate_c.existing_id()));
        }
    }
    let outcome = stage.commit(ctx, &subject, input, output).await?;
    if let WorkerOutcome::Committed { id } = &outcome {
        info!(stage = %name, vehicle_id = %subject.vehicle_id, id = %id, "Stage committed");
    }
    Ok(outcome)
}

//! Pipeline error classes and worker outcomes.
//!
//! Errors map onto the five delivery policies: malformed envelopes are
//! dropped (not retryable), missing prerequisites become a *skipped*
//! outcome rather than an error, model failures surface for bus
//! redelivery, publish failures are fatal to the invocation, and
//! warehouse failures never leave the mirror layer.

use thiserror::Error;

use crate::store::StoreError;

/// Error type shared by every stage worker.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The bus payload could not be decoded into a non-empty JSON object.
    /// Not recoverable by redelivery; the message is logged and dropped.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The envelope decoded but lacks a field the stage contract requires.
    #[error("missing field `{0}` in envelope")]
    MissingField(&'static str),

    /// The model backend kept returning its rate-limit class until the
    /// backoff schedule was exhausted.
    #[error("model rate limit persisted through {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    /// Any other model backend failure, including unparseable output.
    #[error("model backend failure: {0}")]
    Model(String),

    /// Document store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A bus publish failed. Fatal to the invocation; redelivery is safe
    /// because the duplicate gates absorb the repeat.
    #[error("publish to `{topic}` failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Telephony provider rejected or failed the outbound call request.
    #[error("telephony provider failure: {0}")]
    Telephony(String),
}

impl PipelineError {
    /// Whether bus redelivery can make progress on this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MalformedEnvelope(_) | Self::MissingField(_) => false,
            Self::RateLimitExhausted { .. }
            | Self::Model(_)
            | Self::Store(_)
            | Self::Publish { .. }
            | Self::Telephony(_) => true,
        }
    }
}

/// Uniform result of one worker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// A new downstream record was written and its completion published.
    Committed { id: String },
    /// The invocation was absorbed: duplicate delivery, missing
    /// prerequisite, or an upstream status already past this stage.
    Skipped {
        reason: String,
        /// Existing downstream record, when one caused the skip.
        existing_id: Option<String>,
    },
    /// The stage ran to completion but had nothing to persist
    /// (e.g. no anomaly in the telemetry window).
    Clean,
}

impl WorkerOutcome {
    pub fn skipped(reason: impl Into<String>, existing_id: Option<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
            existing_id,
        }
    }

    /// Committed record ID, if any.
    pub fn committed_id(&self) -> Option<&str> {
        match self {
            Self::Committed { id } => Some(id),
            _ => None,
        }
    }
}

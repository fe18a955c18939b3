//! Message bus abstraction.
//!
//! The bus delivers at-least-once with no cross-partition ordering; the
//! duplicate-suppression gates turn that into at-most-one effect per
//! subject. Topic names are arbitrary at the bus level — the envelope
//! contracts are what matter.

pub mod envelope;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::PipelineError;

/// Topic names used by the pipeline wiring.
pub mod topics {
    /// Ingest fan-out: `event_id`, `vehicle_id`, `timestamp`.
    pub const TELEMETRY_INGESTED: &str = "telemetry-ingested";
    /// Anomaly stage completion.
    pub const ANOMALY_DETECTED: &str = "anomaly-detected";
    pub const DIAGNOSIS_COMPLETE: &str = "diagnosis-complete";
    pub const RCA_COMPLETE: &str = "rca-complete";
    pub const SCHEDULING_COMPLETE: &str = "scheduling-complete";
    pub const ENGAGEMENT_COMPLETE: &str = "engagement-complete";
    /// Fan-out from engagement to the live-call stage.
    pub const COMMUNICATION_TRIGGER: &str = "communication-trigger";
    pub const COMMUNICATION_COMPLETE: &str = "communication-complete";
    /// Operator-supplied post-service data.
    pub const FEEDBACK_REQUESTED: &str = "feedback-requested";
    pub const FEEDBACK_COMPLETE: &str = "feedback-complete";
    pub const MANUFACTURING_COMPLETE: &str = "manufacturing-complete";

    // Orchestrator-routed stage inputs. Kept distinct from the completion
    // topics so the confidence gate actually withholds downstream work.
    pub const DIAGNOSIS_INPUT: &str = "diagnosis-input";
    pub const RCA_INPUT: &str = "rca-input";
    pub const SCHEDULING_INPUT: &str = "scheduling-input";
    pub const ENGAGEMENT_INPUT: &str = "engagement-input";
    pub const MANUFACTURING_INPUT: &str = "manufacturing-input";
}

/// Receiving side of one topic subscription.
pub type BusReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// Durable topic-based message bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload. A failure here is fatal to the publishing
    /// invocation; redelivery makes the retry safe.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PipelineError>;

    /// Subscribe to a topic. Every subscriber receives every payload
    /// published after the subscription.
    fn subscribe(&self, topic: &str) -> BusReceiver;
}

/// Serialize a JSON envelope and publish it.
pub async fn publish_json(
    bus: &dyn MessageBus,
    topic: &str,
    message: &Value,
) -> Result<(), PipelineError> {
    let payload = serde_json::to_vec(message).map_err(|e| PipelineError::Publish {
        topic: topic.to_string(),
        reason: e.to_string(),
    })?;
    bus.publish(topic, payload).await
}

/// In-process bus: per-topic fan-out over unbounded channels.
///
/// Used by the single-binary runtime and the test harness. At-least-once
/// is exercised by publishing a payload more than once.
#[derive(Default)]
pub struct InProcessBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PipelineError> {
        let mut map = self.subscribers.lock().map_err(|_| PipelineError::Publish {
            topic: topic.to_string(),
            reason: "subscriber table poisoned".to_string(),
        })?;
        let senders = map.entry(topic.to_string()).or_default();
        // Drop closed subscriptions while fanning out.
        senders.retain(|tx| tx.send(payload.clone()).is_ok());
        debug!(topic, subscribers = senders.len(), "published");
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> BusReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut map) = self.subscribers.lock() {
            map.entry(topic.to_string()).or_default().push(tx);
        }
        rx
    }
}

//! Pipeline runtime — wires workers to their topics.
//!
//! Each stage worker loops on its subscription inside a `JoinSet` task
//! and honors a cancellation token. Workers are stateless; multiple
//! instances of the same stage may run in parallel on different
//! messages, and one invocation is strictly sequential internally.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agents::worker::{run_ai_stage, AiStage, StageContext};
use crate::agents::{
    AnomalyStage, CommunicationWorker, DiagnosisStage, EngagementStage, FeedbackStage,
    ManufacturingStage, Orchestrator, RcaStage, SchedulingStage,
};
use crate::bus::{topics, BusReceiver};
use crate::error::{PipelineError, WorkerOutcome};
use crate::telephony::TelephonyProvider;

/// Completion topics the orchestrator subscribes to.
const ORCHESTRATOR_TOPICS: [&str; 8] = [
    topics::ANOMALY_DETECTED,
    topics::DIAGNOSIS_COMPLETE,
    topics::RCA_COMPLETE,
    topics::SCHEDULING_COMPLETE,
    topics::ENGAGEMENT_COMPLETE,
    topics::COMMUNICATION_COMPLETE,
    topics::FEEDBACK_COMPLETE,
    topics::MANUFACTURING_COMPLETE,
];

async fn worker_loop<F, Fut>(
    name: &'static str,
    topic: &'static str,
    mut rx: BusReceiver,
    cancel: CancellationToken,
    handler: F,
) where
    F: Fn(Vec<u8>) -> Fut,
    Fut: Future<Output = Result<WorkerOutcome, PipelineError>>,
{
    info!(worker = name, topic, "Worker subscribed");
    loop {
        let payload = tokio::select! {
            () = cancel.cancelled() => {
                info!(worker = name, "Worker shutting down");
                return;
            }
            payload = rx.recv() => match payload {
                Some(payload) => payload,
                None => {
                    warn!(worker = name, topic, "Subscription closed");
                    return;
                }
            },
        };
        match handler(payload).await {
            Ok(WorkerOutcome::Committed { id }) => {
                info!(worker = name, id = %id, "Message handled");
            }
            Ok(WorkerOutcome::Skipped { reason, .. }) => {
                info!(worker = name, reason = %reason, "Message absorbed");
            }
            Ok(WorkerOutcome::Clean) => {
                info!(worker = name, "Message handled, nothing to persist");
            }
            Err(e) if e.is_retryable() => {
                // The bus redelivers; the duplicate gates make that safe.
                error!(worker = name, error = %e, "Message failed, awaiting redelivery");
            }
            Err(e) => {
                warn!(worker = name, error = %e, "Message dropped (not recoverable)");
            }
        }
    }
}

fn spawn_ai_stage<S>(
    stage: Arc<S>,
    name: &'static str,
    topic: &'static str,
    ctx: &StageContext,
    tasks: &mut JoinSet<()>,
    cancel: &CancellationToken,
) where
    S: AiStage + Send + Sync + 'static,
{
    let rx = ctx.bus.subscribe(topic);
    let ctx = ctx.clone();
    let cancel = cancel.clone();
    tasks.spawn(async move {
        worker_loop(name, topic, rx, cancel, |payload| {
            let stage = Arc::clone(&stage);
            let ctx = ctx.clone();
            async move { run_ai_stage(stage.as_ref(), &ctx, &payload).await }
        })
        .await;
    });
}

/// Spawn every stage worker and the orchestrator onto the join set.
pub fn spawn_pipeline(
    ctx: &StageContext,
    provider: Arc<dyn TelephonyProvider>,
    tasks: &mut JoinSet<()>,
    cancel: &CancellationToken,
) {
    spawn_ai_stage(
        Arc::new(AnomalyStage),
        "anomaly",
        topics::TELEMETRY_INGESTED,
        ctx,
        tasks,
        cancel,
    );
    // Diagnosis listens both directly on the detection topic and on its
    // orchestrator-routed input; the duplicate gates absorb the overlap.
    spawn_ai_stage(
        Arc::new(DiagnosisStage),
        "diagnosis",
        topics::ANOMALY_DETECTED,
        ctx,
        tasks,
        cancel,
    );
    spawn_ai_stage(
        Arc::new(DiagnosisStage),
        "diagnosis",
        topics::DIAGNOSIS_INPUT,
        ctx,
        tasks,
        cancel,
    );
    spawn_ai_stage(Arc::new(RcaStage), "rca", topics::RCA_INPUT, ctx, tasks, cancel);
    spawn_ai_stage(
        Arc::new(SchedulingStage),
        "scheduling",
        topics::SCHEDULING_INPUT,
        ctx,
        tasks,
        cancel,
    );
    spawn_ai_stage(
        Arc::new(EngagementStage),
        "engagement",
        topics::ENGAGEMENT_INPUT,
        ctx,
        tasks,
        cancel,
    );
    spawn_ai_stage(
        Arc::new(FeedbackStage),
        "feedback",
        topics::FEEDBACK_REQUESTED,
        ctx,
        tasks,
        cancel,
    );
    spawn_ai_stage(
        Arc::new(ManufacturingStage),
        "manufacturing",
        topics::MANUFACTURING_INPUT,
        ctx,
        tasks,
        cancel,
    );

    // Communication: no model, no jitter; bespoke worker.
    {
        let worker = Arc::new(CommunicationWorker::new(provider));
        let rx = ctx.bus.subscribe(topics::COMMUNICATION_TRIGGER);
        let ctx = ctx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            worker_loop(
                "communication",
                topics::COMMUNICATION_TRIGGER,
                rx,
                cancel,
                |payload| {
                    let worker = Arc::clone(&worker);
                    let ctx = ctx.clone();
                    async move { worker.handle(&ctx, &payload).await }
                },
            )
            .await;
        });
    }

    // Orchestrator: one loop per completion topic.
    for topic in ORCHESTRATOR_TOPICS {
        let rx = ctx.bus.subscribe(topic);
        let ctx = ctx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let orchestrator = Orchestrator;
            info!(worker = "orchestrator", topic, "Worker subscribed");
            let mut rx = rx;
            loop {
                let payload = tokio::select! {
                    () = cancel.cancelled() => return,
                    payload = rx.recv() => match payload {
                        Some(payload) => payload,
                        None => return,
                    },
                };
                match orchestrator.handle(&ctx, &payload).await {
                    Ok(decision) => info!(worker = "orchestrator", ?decision, "Routing decision"),
                    Err(e) if e.is_retryable() => {
                        error!(worker = "orchestrator", error = %e, "Routing failed, awaiting redelivery");
                    }
                    Err(e) => {
                        warn!(worker = "orchestrator", error = %e, "Message dropped (not recoverable)");
                    }
                }
            }
        });
    }
}

//! Telephony webhook — the live-call dialog driver.
//!
//! The provider calls back here for the initial answer, each gathered
//! customer input, and call status changes. The dialog is a short state
//! machine `greeting → explanation → (scheduling | questions) →
//! completed`; every transition appends a short turn to the transcript
//! and either re-gathers input or hangs up. A terminal dialog state, or
//! a terminal call status from the provider, completes the
//! communication case and publishes `communication-complete`.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::bus::{publish_json, topics, MessageBus};
use crate::store::DocumentStore;
use crate::types::{
    CallContext, CallOutcome, CallStatus, CommunicationCase, ConversationStage, DialogueTurn,
};

/// Shared state for the webhook handlers.
pub struct WebhookState {
    pub store: DocumentStore,
    pub bus: Arc<dyn MessageBus>,
    /// Public base URL used for gather action links.
    pub base_url: String,
}

/// Provider callback form fields.
#[derive(Debug, Deserialize)]
pub struct ProviderCallback {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: Option<String>,
    #[serde(rename = "Digits", default)]
    pub digits: Option<String>,
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
}

impl ProviderCallback {
    fn input(&self) -> String {
        self.speech_result
            .clone()
            .or_else(|| self.digits.clone())
            .unwrap_or_default()
    }
}

/// Dialog context for composing turns.
pub struct TurnContext<'a> {
    pub vehicle_id: &'a str,
    pub best_slot: Option<&'a str>,
}

/// One dialog transition.
pub struct Transition {
    pub next: ConversationStage,
    pub reply: String,
    pub outcome: Option<CallOutcome>,
}

impl Transition {
    pub fn is_terminal(&self) -> bool {
        self.next == ConversationStage::Completed
    }
}

fn word_match(input: &str, words: &[&str]) -> bool {
    input
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|w| words.contains(&w))
}

fn affirmative(input: &str) -> bool {
    word_match(input, &["yes", "yeah", "ok", "okay", "sure", "confirm", "1"])
}

fn negative(input: &str) -> bool {
    word_match(input, &["no", "nope", "cancel", "decline", "2"])
}

/// Advance the dialog state machine. Every reply stays under 30 words.
pub fn advance(stage: ConversationStage, input: &str, ctx: &TurnContext<'_>) -> Transition {
    match stage {
        ConversationStage::Pending | ConversationStage::Greeting => Transition {
            next: ConversationStage::Explanation,
            reply: format!(
                "Our diagnostics flagged an issue on vehicle {}. We recommend a service visit soon. Would you like to book a slot?",
                ctx.vehicle_id
            ),
            outcome: None,
        },
        ConversationStage::Explanation => {
            if affirmative(input) {
                let slot = ctx.best_slot.unwrap_or("the next available slot");
                Transition {
                    next: ConversationStage::Scheduling,
                    reply: format!("Great. We can take your vehicle at {slot}. Should I confirm the appointment?"),
                    outcome: None,
                }
            } else {
                Transition {
                    next: ConversationStage::Questions,
                    reply: "Of course. What would you like to know before deciding?".to_string(),
                    outcome: None,
                }
            }
        }
        ConversationStage::Scheduling => {
            if affirmative(input) {
                Transition {
                    next: ConversationStage::Completed,
                    reply: "Your appointment is confirmed. Thank you, goodbye.".to_string(),
                    outcome: Some(CallOutcome::Confirmed),
                }
            } else {
                Transition {
                    next: ConversationStage::Completed,
                    reply: "No problem, we will follow up another time. Goodbye.".to_string(),
                    outcome: Some(CallOutcome::Declined),
                }
            }
        }
        ConversationStage::Questions => {
            if affirmative(input) {
                Transition {
                    next: ConversationStage::Completed,
                    reply: "Glad that helped. Your appointment is confirmed. Goodbye.".to_string(),
                    outcome: Some(CallOutcome::Confirmed),
                }
            } else if negative(input) {
                Transition {
                    next: ConversationStage::Completed,
                    reply: "Understood, we will not book anything today. Goodbye.".to_string(),
                    outcome: Some(CallOutcome::Declined),
                }
            } else {
                Transition {
                    next: ConversationStage::Completed,
                    reply: "Our service team will reach out with details. Goodbye.".to_string(),
                    outcome: None,
                }
            }
        }
        ConversationStage::Completed => Transition {
            next: ConversationStage::Completed,
            reply: "Goodbye.".to_string(),
            outcome: None,
        },
    }
}

pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhook/voice", post(handle_voice))
        .route("/webhook/gather", post(handle_gather))
        .route("/webhook/status", post(handle_status))
        .with_state(state)
}

fn xml_response(body: String) -> Response {
    ([(CONTENT_TYPE, "application/xml")], body).into_response()
}

fn gather_twiml(base_url: &str, text: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Gather input=\"speech dtmf\" timeout=\"5\" action=\"{base_url}/webhook/gather\" method=\"POST\"><Say>{text}</Say></Gather></Response>"
    )
}

fn hangup_twiml(text: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Say>{text}</Say><Hangup/></Response>"
    )
}

fn error_twiml() -> Response {
    xml_response(hangup_twiml(
        "We are sorry, something went wrong. Goodbye.",
    ))
}

fn load_call(
    state: &WebhookState,
    call_sid: &str,
) -> Option<(CallContext, CommunicationCase)> {
    let context = state.store.get_call_context(call_sid).ok().flatten()?;
    let case = state
        .store
        .get_communication(&context.communication_id)
        .ok()
        .flatten()?;
    Some((context, case))
}

/// Initial answer: greet and gather.
async fn handle_voice(
    State(state): State<Arc<WebhookState>>,
    Form(callback): Form<ProviderCallback>,
) -> Response {
    let Some((context, case)) = load_call(&state, &callback.call_sid) else {
        warn!(call_sid = %callback.call_sid, "Voice callback without call context");
        return error_twiml();
    };

    let name = context.customer_name.as_deref().unwrap_or("there");
    let greeting = format!(
        "Hello {name}, this is the service team calling about your vehicle {}. Do you have a moment?",
        context.vehicle_id
    );
    let update = state
        .store
        .update_communication(&case.communication_id, |c| {
            c.call_status = CallStatus::Answered;
            c.conversation_stage = ConversationStage::Greeting;
            c.conversation_transcript.push(DialogueTurn::agent(greeting.clone()));
        });
    if let Err(e) = update {
        error!(call_sid = %callback.call_sid, error = %e, "Failed to record greeting");
        return error_twiml();
    }
    xml_response(gather_twiml(&state.base_url, &greeting))
}

/// Gathered customer input: advance the dialog.
async fn handle_gather(
    State(state): State<Arc<WebhookState>>,
    Form(callback): Form<ProviderCallback>,
) -> Response {
    let Some((context, case)) = load_call(&state, &callback.call_sid) else {
        warn!(call_sid = %callback.call_sid, "Gather callback without call context");
        return error_twiml();
    };

    let input = callback.input();
    let transition = advance(
        case.conversation_stage,
        &input,
        &TurnContext {
            vehicle_id: &context.vehicle_id,
            best_slot: context.best_slot.as_deref(),
        },
    );

    let terminal = transition.is_terminal();
    let outcome = transition.outcome;
    let reply = transition.reply.clone();
    let update = state
        .store
        .update_communication(&case.communication_id, |c| {
            if !input.is_empty() {
                c.conversation_transcript.push(DialogueTurn::customer(input.clone()));
            }
            c.conversation_transcript.push(DialogueTurn::agent(reply.clone()));
            c.conversation_stage = transition.next;
            if terminal {
                c.call_status = CallStatus::Completed;
                c.outcome = outcome;
            }
        });
    let updated = match update {
        Ok(updated) => updated,
        Err(e) => {
            error!(call_sid = %callback.call_sid, error = %e, "Failed to advance dialog");
            return error_twiml();
        }
    };

    if terminal {
        publish_completion(&state, &updated).await;
        info!(
            communication_id = %updated.communication_id,
            outcome = ?updated.outcome,
            "Call dialog completed"
        );
        return xml_response(hangup_twiml(&reply));
    }
    xml_response(gather_twiml(&state.base_url, &reply))
}

/// Provider call status updates; terminal statuses close the case.
async fn handle_status(
    State(state): State<Arc<WebhookState>>,
    Form(callback): Form<ProviderCallback>,
) -> Response {
    let status = callback.call_status.as_deref().unwrap_or_default();
    let terminal_failure = matches!(status, "failed" | "busy" | "no-answer" | "canceled");
    if !(terminal_failure || status == "completed") {
        return xml_response(hangup_twiml("Thank you."));
    }

    let Some((_context, case)) = load_call(&state, &callback.call_sid) else {
        return xml_response(hangup_twiml("Thank you."));
    };
    if case.call_status == CallStatus::Completed && case.conversation_stage == ConversationStage::Completed
    {
        // Dialog already closed the case; nothing left to do.
        return xml_response(hangup_twiml("Thank you."));
    }

    let update = state
        .store
        .update_communication(&case.communication_id, |c| {
            c.call_status = if terminal_failure {
                CallStatus::Failed
            } else {
                CallStatus::Completed
            };
            c.conversation_stage = ConversationStage::Completed;
        });
    match update {
        Ok(updated) => publish_completion(&state, &updated).await,
        Err(e) => error!(call_sid = %callback.call_sid, error = %e, "Failed to close call"),
    }
    xml_response(hangup_twiml("Thank you."))
}

async fn publish_completion(state: &WebhookState, case: &CommunicationCase) {
    let message = json!({
        "communication_id": case.communication_id,
        "engagement_id": case.engagement_id,
        "case_id": case.case_id,
        "vehicle_id": case.vehicle_id,
        "outcome": case.outcome,
        "booking_id": case.booking_id,
        "agent_stage": crate::types::Stage::Communication,
    });
    if let Err(e) = publish_json(state.bus.as_ref(), topics::COMMUNICATION_COMPLETE, &message).await
    {
        error!(communication_id = %case.communication_id, error = %e, "Failed to publish communication completion");
    }
}

//! Engagement, booking, communication, feedback and manufacturing records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Severity;

/// Outcome of the simulated customer dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerDecision {
    Confirmed,
    Declined,
    NoResponse,
}

impl CustomerDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Declined => "declined",
            Self::NoResponse => "no_response",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "confirmed" => Some(Self::Confirmed),
            "declined" => Some(Self::Declined),
            "no_response" => Some(Self::NoResponse),
            _ => None,
        }
    }
}

/// Engagement cases are written once, already complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStatus {
    Completed,
}

/// One turn of a dialogue transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTurn {
    /// `agent` or `customer`.
    pub speaker: String,
    pub text: String,
}

impl DialogueTurn {
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            speaker: "agent".to_string(),
            text: text.into(),
        }
    }

    pub fn customer(text: impl Into<String>) -> Self {
        Self {
            speaker: "customer".to_string(),
            text: text.into(),
        }
    }
}

/// Engagement case (`engagement_<hex>`).
///
/// Invariant: `booking_id` is set exactly when the decision is
/// `confirmed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementCase {
    pub engagement_id: String,
    pub scheduling_id: String,
    pub rca_id: String,
    pub case_id: String,
    pub vehicle_id: String,
    pub customer_phone: Option<String>,
    pub customer_name: Option<String>,
    pub customer_decision: CustomerDecision,
    pub booking_id: Option<String>,
    pub transcript: Vec<DialogueTurn>,
    pub status: EngagementStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Booking lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Pending,
    FeedbackComplete,
}

/// Service booking, keyed by the agent-issued `booking_<hex>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: String,
    pub case_id: String,
    pub vehicle_id: String,
    pub service_center: String,
    /// UTC ISO-8601 instant.
    pub scheduled_slot: String,
    pub status: BookingStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Telephony call lifecycle as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiating,
    Initiated,
    Ringing,
    Answered,
    Completed,
    Failed,
}

/// Webhook dialog state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    Pending,
    Greeting,
    Explanation,
    Scheduling,
    Questions,
    Completed,
}

/// Final outcome derived from the live call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Confirmed,
    Declined,
}

/// Communication case (`comm_<hex>`), driven by the live-call stage and
/// its webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationCase {
    pub communication_id: String,
    pub engagement_id: String,
    pub case_id: String,
    pub vehicle_id: String,
    pub customer_phone: String,
    pub customer_name: Option<String>,
    pub call_status: CallStatus,
    pub conversation_stage: ConversationStage,
    pub conversation_transcript: Vec<DialogueTurn>,
    pub outcome: Option<CallOutcome>,
    pub booking_id: Option<String>,
    /// External call correlator issued by the provider.
    pub call_sid: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Post-service validation verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationLabel {
    Correct,
    Recurring,
    Incorrect,
}

impl ValidationLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "Correct",
            Self::Recurring => "Recurring",
            Self::Incorrect => "Incorrect",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Correct" => Some(Self::Correct),
            "Recurring" => Some(Self::Recurring),
            "Incorrect" => Some(Self::Incorrect),
            _ => None,
        }
    }

    /// Invariant: retraining is recommended exactly for `Recurring` and
    /// `Incorrect`.
    pub fn recommends_retrain(self) -> bool {
        matches!(self, Self::Recurring | Self::Incorrect)
    }
}

/// Feedback case (`feedback_<hex>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackCase {
    pub feedback_id: String,
    pub booking_id: String,
    pub case_id: String,
    pub vehicle_id: String,
    /// Customer Effort Index, 1.0–5.0.
    pub cei_score: f64,
    pub validation_label: ValidationLabel,
    pub recommended_retrain: bool,
    pub technician_notes: Option<String>,
    pub customer_rating: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Manufacturing-quality case (`manufacturing_<hex>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManufacturingCase {
    pub manufacturing_id: String,
    pub feedback_id: String,
    pub case_id: String,
    pub vehicle_id: String,
    pub issue: String,
    pub capa_recommendation: String,
    pub severity: Severity,
    /// At least 1; the max of the three recurrence counts unless the
    /// model returned a higher defensible value.
    pub recurrence_cluster_size: u32,
    /// Same anomaly type on the same vehicle.
    pub recurrence_count: u32,
    /// Same anomaly type across the fleet.
    pub fleet_recurrence_count: u32,
    /// Same component across the fleet.
    pub component_recurrence_count: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

//! Stage identity, routing state and human-review records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Producing stage of a pipeline message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The anomaly-detection stage keeps its historical wire name.
    DataAnalysis,
    Diagnosis,
    Rca,
    Scheduling,
    Engagement,
    Communication,
    Feedback,
    Manufacturing,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DataAnalysis => "data_analysis",
            Self::Diagnosis => "diagnosis",
            Self::Rca => "rca",
            Self::Scheduling => "scheduling",
            Self::Engagement => "engagement",
            Self::Communication => "communication",
            Self::Feedback => "feedback",
            Self::Manufacturing => "manufacturing",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "data_analysis" => Some(Self::DataAnalysis),
            "diagnosis" => Some(Self::Diagnosis),
            "rca" => Some(Self::Rca),
            "scheduling" => Some(Self::Scheduling),
            "engagement" => Some(Self::Engagement),
            "communication" => Some(Self::Communication),
            "feedback" => Some(Self::Feedback),
            "manufacturing" => Some(Self::Manufacturing),
            _ => None,
        }
    }

    /// Static successor table. `engagement`, `communication` and
    /// `manufacturing` are terminal; `feedback → manufacturing` is its
    /// own path.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::DataAnalysis => Some(Self::Diagnosis),
            Self::Diagnosis => Some(Self::Rca),
            Self::Rca => Some(Self::Scheduling),
            Self::Scheduling => Some(Self::Engagement),
            Self::Feedback => Some(Self::Manufacturing),
            Self::Engagement | Self::Communication | Self::Manufacturing => None,
        }
    }

    /// Only the critical stages are confidence-gated.
    pub fn is_confidence_gated(self) -> bool {
        matches!(self, Self::DataAnalysis | Self::Diagnosis | Self::Rca)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline routing state, keyed by `case_id`. Written after every
/// orchestration decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub case_id: String,
    pub current_stage: Stage,
    /// Next stage name, or the `human_review` / `completed` pseudo-stages.
    pub next_stage: String,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Review queue status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Resolved,
}

/// Human-review record, keyed `<case_id>_<stage>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanReview {
    pub review_id: String,
    pub case_id: String,
    pub vehicle_id: Option<String>,
    pub agent_stage: Stage,
    pub confidence: f64,
    pub review_status: ReviewStatus,
    /// Full envelope forwarded for the reviewer.
    pub message_data: Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_wire_names() {
        assert_eq!(Stage::DataAnalysis.as_str(), "data_analysis");
        assert_eq!(Stage::parse("rca"), Some(Stage::Rca));
        assert_eq!(serde_json::to_string(&Stage::DataAnalysis).unwrap(), "\"data_analysis\"");
        assert_eq!(Stage::parse("analysis"), None);
    }

    #[test]
    fn successor_table() {
        assert_eq!(Stage::DataAnalysis.successor(), Some(Stage::Diagnosis));
        assert_eq!(Stage::Diagnosis.successor(), Some(Stage::Rca));
        assert_eq!(Stage::Rca.successor(), Some(Stage::Scheduling));
        assert_eq!(Stage::Scheduling.successor(), Some(Stage::Engagement));
        assert_eq!(Stage::Engagement.successor(), None);
        assert_eq!(Stage::Communication.successor(), None);
        assert_eq!(Stage::Feedback.successor(), Some(Stage::Manufacturing));
        assert_eq!(Stage::Manufacturing.successor(), None);
    }

    #[test]
    fn gated_stages() {
        assert!(Stage::DataAnalysis.is_confidence_gated());
        assert!(Stage::Diagnosis.is_confidence_gated());
        assert!(Stage::Rca.is_confidence_gated());
        assert!(!Stage::Scheduling.is_confidence_gated());
        assert!(!Stage::Engagement.is_confidence_gated());
    }
}

//! Case records for the anomaly → diagnosis → RCA → scheduling stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Closed-set enums
// ============================================================================

/// Closed set of detectable anomaly classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    ThermalOverheat,
    OilOverheat,
    BatteryDegradation,
    LowCharge,
    RpmSpike,
    RpmStall,
    DtcFault,
    SpeedAnomaly,
    GpsAnomaly,
}

impl AnomalyType {
    pub const ALL: [Self; 9] = [
        Self::ThermalOverheat,
        Self::OilOverheat,
        Self::BatteryDegradation,
        Self::LowCharge,
        Self::RpmSpike,
        Self::RpmStall,
        Self::DtcFault,
        Self::SpeedAnomaly,
        Self::GpsAnomaly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThermalOverheat => "thermal_overheat",
            Self::OilOverheat => "oil_overheat",
            Self::BatteryDegradation => "battery_degradation",
            Self::LowCharge => "low_charge",
            Self::RpmSpike => "rpm_spike",
            Self::RpmStall => "rpm_stall",
            Self::DtcFault => "dtc_fault",
            Self::SpeedAnomaly => "speed_anomaly",
            Self::GpsAnomaly => "gps_anomaly",
        }
    }

    /// Parse the exact wire string; anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == raw)
    }
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anomaly case lifecycle. Advances monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    PendingDiagnosis,
    Diagnosing,
    Diagnosed,
    Scheduled,
    Engaged,
    Completed,
}

impl CaseStatus {
    /// Statuses past `pending_diagnosis`, i.e. a downstream worker owns
    /// the case already.
    pub fn is_past_pending(self) -> bool {
        !matches!(self, Self::PendingDiagnosis)
    }

    /// Position in the lifecycle, for monotonicity checks.
    pub fn rank(self) -> u8 {
        match self {
            Self::PendingDiagnosis => 0,
            Self::Diagnosing => 1,
            Self::Diagnosed => 2,
            Self::Scheduled => 3,
            Self::Engaged => 4,
            Self::Completed => 5,
        }
    }
}

/// Case-sensitive severity label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Diagnosis invariant: Low below 0.3, Medium below 0.7, High above.
    pub fn from_failure_probability(p: f64) -> Self {
        if p >= 0.7 {
            Self::High
        } else if p >= 0.3 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Label carried on the anomaly-detected envelope, derived from the
    /// severity score (High above 0.7, Medium above 0.4).
    pub fn from_severity_score(score: f64) -> Self {
        if score > 0.7 {
            Self::High
        } else if score > 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Low" => Some(Self::Low),
            "Medium" => Some(Self::Medium),
            "High" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnosis case lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisStatus {
    PendingRca,
    RcaComplete,
    Scheduled,
    Engaged,
    Completed,
}

impl DiagnosisStatus {
    pub fn rank(self) -> u8 {
        match self {
            Self::PendingRca => 0,
            Self::RcaComplete => 1,
            Self::Scheduled => 2,
            Self::Engaged => 3,
            Self::Completed => 4,
        }
    }
}

/// RCA case lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RcaStatus {
    PendingScheduling,
    Scheduled,
    Engaged,
    Completed,
}

impl RcaStatus {
    pub fn rank(self) -> u8 {
        match self {
            Self::PendingScheduling => 0,
            Self::Scheduled => 1,
            Self::Engaged => 2,
            Self::Completed => 3,
        }
    }
}

/// Corrective addresses the immediate failure; Preventive targets a
/// process or design change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapaType {
    Corrective,
    Preventive,
}

impl CapaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Corrective => "Corrective",
            Self::Preventive => "Preventive",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Corrective" => Some(Self::Corrective),
            "Preventive" => Some(Self::Preventive),
            _ => None,
        }
    }
}

/// Booking urgency band, derived from the diagnosis RUL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    Urgent,
    Normal,
    Delayed,
}

impl SlotType {
    /// Invariant: urgent below 7 days, normal below 30, delayed from 30.
    pub fn from_rul_days(rul_days: u32) -> Self {
        if rul_days < 7 {
            Self::Urgent
        } else if rul_days < 30 {
            Self::Normal
        } else {
            Self::Delayed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::Normal => "normal",
            Self::Delayed => "delayed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "urgent" => Some(Self::Urgent),
            "normal" => Some(Self::Normal),
            "delayed" => Some(Self::Delayed),
            _ => None,
        }
    }
}

/// Scheduling case lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStatus {
    PendingEngagement,
    EngagementComplete,
}

// ============================================================================
// Case records
// ============================================================================

/// Anomaly case (`case_<hex>`), the pipeline subject.
///
/// Invariant: `anomaly_detected == false` exactly when `anomaly_type`
/// and `severity_score` are both null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyCase {
    pub case_id: String,
    pub vehicle_id: String,
    pub anomaly_detected: bool,
    pub anomaly_type: Option<AnomalyType>,
    pub severity_score: Option<f64>,
    pub telemetry_event_ids: Vec<String>,
    pub status: CaseStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl AnomalyCase {
    /// Severity label carried on the completion envelope.
    pub fn severity_label(&self) -> Severity {
        Severity::from_severity_score(self.severity_score.unwrap_or(0.0))
    }

    /// Routing confidence: `1 − severity_score`. Intentionally inverted —
    /// higher severity means lower confidence in automated routing.
    pub fn routing_confidence(&self) -> f64 {
        1.0 - self.severity_score.unwrap_or(0.0)
    }
}

/// Diagnosis case (`diagnosis_<hex>`).
///
/// Invariant: `severity` matches the `failure_probability` band
/// (0.3 and 0.7 boundaries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisCase {
    pub diagnosis_id: String,
    pub case_id: String,
    pub vehicle_id: String,
    pub component: String,
    pub failure_probability: f64,
    /// Remaining useful life in days, floor 1.
    pub estimated_rul_days: u32,
    pub severity: Severity,
    pub context_event_ids: Vec<String>,
    pub status: DiagnosisStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Root-cause-analysis case (`rca_<hex>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcaCase {
    pub rca_id: String,
    pub diagnosis_id: String,
    pub case_id: String,
    pub vehicle_id: String,
    pub root_cause: String,
    /// Gating input for the orchestrator; allowed to be low.
    pub confidence: f64,
    pub recommended_action: String,
    pub capa_type: CapaType,
    pub status: RcaStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Scheduling case (`scheduling_<hex>`). Slots are UTC ISO-8601 instants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingCase {
    pub scheduling_id: String,
    pub rca_id: String,
    pub diagnosis_id: String,
    pub case_id: String,
    pub vehicle_id: String,
    pub best_slot: String,
    pub service_center: String,
    pub slot_type: SlotType,
    /// At least two alternates, all with parts and technician availability.
    pub fallback_slots: Vec<String>,
    pub status: SchedulingStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomaly_type_wire_strings() {
        for t in AnomalyType::ALL {
            assert_eq!(AnomalyType::parse(t.as_str()), Some(t));
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
        assert_eq!(AnomalyType::parse("overheat"), None);
    }

    #[test]
    fn severity_bands() {
        assert_eq!(Severity::from_failure_probability(0.0), Severity::Low);
        assert_eq!(Severity::from_failure_probability(0.29), Severity::Low);
        assert_eq!(Severity::from_failure_probability(0.3), Severity::Medium);
        assert_eq!(Severity::from_failure_probability(0.69), Severity::Medium);
        assert_eq!(Severity::from_failure_probability(0.7), Severity::High);
        assert_eq!(Severity::from_failure_probability(1.0), Severity::High);
    }

    #[test]
    fn slot_type_bands() {
        assert_eq!(SlotType::from_rul_days(1), SlotType::Urgent);
        assert_eq!(SlotType::from_rul_days(6), SlotType::Urgent);
        assert_eq!(SlotType::from_rul_days(7), SlotType::Normal);
        assert_eq!(SlotType::from_rul_days(29), SlotType::Normal);
        assert_eq!(SlotType::from_rul_days(30), SlotType::Delayed);
    }

    #[test]
    fn status_strings_are_snake_case() {
        let s = serde_json::to_string(&CaseStatus::PendingDiagnosis).unwrap();
        assert_eq!(s, "\"pending_diagnosis\"");
        let s = serde_json::to_string(&DiagnosisStatus::RcaComplete).unwrap();
        assert_eq!(s, "\"rca_complete\"");
        let s = serde_json::to_string(&SchedulingStatus::PendingEngagement).unwrap();
        assert_eq!(s, "\"pending_engagement\"");
    }

    #[test]
    fn routing_confidence_inverts_severity() {
        let case = AnomalyCase {
            case_id: "case_0000000001".into(),
            vehicle_id: "V1".into(),
            anomaly_detected: true,
            anomaly_type: Some(AnomalyType::ThermalOverheat),
            severity_score: Some(0.75),
            telemetry_event_ids: vec![],
            status: CaseStatus::PendingDiagnosis,
            created_at: None,
        };
        assert!((case.routing_confidence() - 0.25).abs() < 1e-9);
        assert_eq!(case.severity_label(), Severity::High);
    }
}

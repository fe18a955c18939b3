//! Pipeline Configuration Module
//!
//! One per-process config struct passed into every worker constructor.
//!
//! ## Loading Order
//!
//! 1. `AURIGA_CONFIG` environment variable (path to TOML file)
//! 2. `auriga.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Individual fields can then be overridden by environment variables
//! (`PROJECT_ID`, `REGION`, `CONFIDENCE_THRESHOLD`, ...). Values pasted
//! into env vars sometimes arrive with further `KEY=value` text
//! concatenated; overrides are truncated at the first whitespace or `=`.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

/// Default confidence threshold for orchestrator routing.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Default duplicate-suppression window in seconds.
pub const DEFAULT_DUPLICATE_WINDOW_SECS: u64 = 30;

/// Telephony provider credentials and addressing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Caller number presented on outbound calls, E.164.
    pub caller_number: String,
    /// Public base URL of the webhook component, without trailing slash.
    pub webhook_base_url: String,
}

/// Process-wide pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Project identifier for backend addressing.
    pub project_id: String,
    /// Region for backend addressing.
    pub region: String,
    /// Model gateway endpoint consuming `{"prompt": ...}`.
    pub model_gateway_url: String,
    /// Orchestrator routing threshold; below it, critical stages go to
    /// human review.
    pub confidence_threshold: f64,
    /// The single tunable trading suppression aggressiveness against
    /// legitimate re-occurrence latency.
    pub duplicate_window_secs: u64,
    /// Upper bound of the uniform pre-model jitter sleep.
    pub jitter_max_secs: f64,
    /// Initial backoff delay on a model rate limit.
    pub backoff_initial_secs: f64,
    /// Maximum model attempts per invocation.
    pub backoff_max_attempts: u32,
    /// Country prefix applied to phone numbers missing one.
    pub default_country_code: String,
    /// Document store location.
    pub store_path: PathBuf,
    /// Warehouse mirror directory; `None` disables the mirror.
    pub warehouse_path: Option<PathBuf>,
    /// Bind address for the ingest + webhook HTTP server.
    pub http_addr: String,
    pub telephony: TelephonyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_id: "auriga-local".to_string(),
            region: "us-central1".to_string(),
            model_gateway_url: "http://127.0.0.1:8600/generate".to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            duplicate_window_secs: DEFAULT_DUPLICATE_WINDOW_SECS,
            jitter_max_secs: 10.0,
            backoff_initial_secs: 2.0,
            backoff_max_attempts: 5,
            default_country_code: "+91".to_string(),
            store_path: PathBuf::from("auriga-data"),
            warehouse_path: None,
            http_addr: "0.0.0.0:8080".to_string(),
            telephony: TelephonyConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration: TOML file, then environment overrides.
    pub fn load() -> Self {
        let mut config = Self::from_toml().unwrap_or_default();
        config.apply_env_overrides();
        config
    }

    fn from_toml() -> Option<Self> {
        let path = std::env::var("AURIGA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("auriga.toml"));
        let raw = std::fs::read_to_string(&path).ok()?;
        match toml::from_str(&raw) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                None
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PROJECT_ID") {
            self.project_id = sanitize_env_value(&v);
        }
        if let Ok(v) = std::env::var("REGION") {
            self.region = sanitize_env_value(&v);
        }
        if let Ok(v) = std::env::var("MODEL_GATEWAY_URL") {
            self.model_gateway_url = v.trim().to_string();
        }
        if let Ok(v) = std::env::var("CONFIDENCE_THRESHOLD") {
            if let Ok(t) = sanitize_env_value(&v).parse() {
                self.confidence_threshold = t;
            }
        }
        if let Ok(v) = std::env::var("DUPLICATE_WINDOW_SECS") {
            if let Ok(w) = sanitize_env_value(&v).parse() {
                self.duplicate_window_secs = w;
            }
        }
        if let Ok(v) = std::env::var("TWILIO_ACCOUNT_SID") {
            self.telephony.account_sid = sanitize_env_value(&v);
        }
        if let Ok(v) = std::env::var("TWILIO_AUTH_TOKEN") {
            self.telephony.auth_token = sanitize_env_value(&v);
        }
        if let Ok(v) = std::env::var("TWILIO_CALLER_NUMBER") {
            self.telephony.caller_number = sanitize_env_value(&v);
        }
        if let Ok(v) = std::env::var("TWILIO_WEBHOOK_BASE_URL") {
            self.telephony.webhook_base_url = v.trim().to_string();
        }
    }

    /// Duplicate-suppression window as a chrono duration.
    pub fn duplicate_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.duplicate_window_secs).unwrap_or(30))
    }
}

/// Truncate an environment value at the first whitespace or `=`, so
/// `"proj-1 REGION=us"` yields `"proj-1"`.
fn sanitize_env_value(raw: &str) -> String {
    raw.trim()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .split('=')
        .next()
        .unwrap_or("")
        .to_string()
}

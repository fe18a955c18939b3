//! Model backend abstraction.
//!
//! The generative backend is a pure function `prompt → text` with a
//! single retryable error class. Rate limits are retried with
//! exponential backoff plus additive jitter; everything else surfaces
//! immediately. The backend's own rate-limit response is the sole flow
//! control — no token bucket is maintained.

pub mod gateway;

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::PipelineError;

/// Backend failure classes.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The backend refused on rate-limit grounds; retryable.
    #[error("model backend rate limited")]
    RateLimited,
    /// Any other backend failure; not retried.
    #[error("model backend error: {0}")]
    Backend(String),
}

/// Generative model backend.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Retry schedule for rate-limited calls.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// First retry delay; doubles on each further attempt.
    pub initial: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after the given zero-based failed attempt:
    /// `initial * 2^attempt`, capped at one doubling per attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Invoke the backend, retrying only the rate-limit class.
pub async fn generate_with_backoff(
    backend: &dyn ModelBackend,
    prompt: &str,
    policy: BackoffPolicy,
) -> Result<String, PipelineError> {
    for attempt in 0..policy.max_attempts {
        match backend.generate(prompt).await {
            Ok(text) => return Ok(text),
            Err(ModelError::RateLimited) if attempt + 1 < policy.max_attempts => {
                let jitter = rand::thread_rng().gen_range(0.0..1.0);
                let wait = policy.delay_for_attempt(attempt) + Duration::from_secs_f64(jitter);
                info!(
                    attempt = attempt + 1,
                    max = policy.max_attempts,
                    wait_secs = wait.as_secs_f64(),
                    "Model rate limited, backing off"
                );
                tokio::time::sleep(wait).await;
            }
            Err(ModelError::RateLimited) => {
                warn!(attempts = policy.max_attempts, "Model rate limit persisted");
                return Err(PipelineError::RateLimitExhausted {
                    attempts: policy.max_attempts,
                });
            }
            Err(ModelError::Backend(reason)) => return Err(PipelineError::Model(reason)),
        }
    }
    Err(PipelineError::RateLimitExhausted {
        attempts: policy.max_attempts,
    })
}

/// Extract the JSON object from a model response, stripping any
/// triple-backtick fence and falling back to the outermost `{...}` span.
pub fn extract_json(text: &str) -> Result<serde_json::Value, PipelineError> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    let body = body.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if value.is_object() {
            return Ok(value);
        }
    }
    // Outermost object span, for responses with prose around the JSON.
    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body[start..=end]) {
                if value.is_object() {
                    return Ok(value);
                }
            }
        }
    }
    Err(PipelineError::Model(format!(
        "response is not a JSON object: {}",
        &text.chars().take(120).collect::<String>()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyBackend {
        failures: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ModelBackend for FlakyBackend {
        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures.load(Ordering::SeqCst) {
                Err(ModelError::RateLimited)
            } else {
                Ok("{\"ok\":true}".to_string())
            }
        }
    }

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(1),
            max_attempts: 5,
        }
    }

    #[tokio::test]
    async fn recovers_from_transient_rate_limits() {
        let backend = FlakyBackend {
            failures: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        };
        let out = generate_with_backoff(&backend, "p", fast_policy()).await.unwrap();
        assert_eq!(out, "{\"ok\":true}");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let backend = FlakyBackend {
            failures: AtomicU32::new(100),
            calls: AtomicU32::new(0),
        };
        let err = generate_with_backoff(&backend, "p", fast_policy()).await.unwrap_err();
        assert!(matches!(err, PipelineError::RateLimitExhausted { attempts: 5 }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn other_errors_surface_immediately() {
        struct Broken;
        #[async_trait]
        impl ModelBackend for Broken {
            async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
                Err(ModelError::Backend("boom".to_string()))
            }
        }
        let err = generate_with_backoff(&Broken, "p", fast_policy()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Model(_)));
    }

    #[test]
    fn backoff_schedule_doubles() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(32));
    }

    #[test]
    fn extract_json_handles_fences() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(fenced).unwrap()["a"], 1);
        let bare = "{\"a\": 2}";
        assert_eq!(extract_json(bare).unwrap()["a"], 2);
        let chatty = "Here you go:\n{\"a\": 3}\nHope that helps!";
        assert_eq!(extract_json(chatty).unwrap()["a"], 3);
        let plain_fence = "```\n{\"a\": 4}\n```";
        assert_eq!(extract_json(plain_fence).unwrap()["a"], 4);
    }

    #[test]
    fn extract_json_rejects_non_objects() {
        assert!(extract_json("[1,2]").is_err());
        assert!(extract_json("no json here").is_err());
    }
}

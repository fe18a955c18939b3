//! HTTP model gateway backend.
//!
//! POSTs `{"prompt": ...}` to the configured endpoint and reads the
//! response text. HTTP 429 maps to the retryable rate-limit class; any
//! other failure is terminal for the invocation.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::{ModelBackend, ModelError};

/// Remote generative backend reached over HTTP.
pub struct GatewayBackend {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct GatewayResponse {
    text: String,
}

impl GatewayBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ModelBackend for GatewayBackend {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| ModelError::Backend(e.to_string()))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ModelError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(ModelError::Backend(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Backend(e.to_string()))?;
        // The gateway answers either `{"text": "..."}` or the raw text.
        match serde_json::from_str::<GatewayResponse>(&body) {
            Ok(parsed) => Ok(parsed.text),
            Err(_) => Ok(body),
        }
    }
}

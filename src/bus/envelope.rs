//! Envelope decoding.
//!
//! A bus payload may arrive in three shapes:
//!
//! 1. raw JSON bytes,
//! 2. a JSON string (itself JSON, or base64 of JSON),
//! 3. the legacy wrapper `{"message":{"data":"<base64-of-json>"}}`.
//!
//! All three decode to the same non-empty JSON object. A payload that
//! fails to produce one is a malformed envelope: not recoverable by
//! redelivery, so decoding errors are fast returns, not retries.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::error::PipelineError;

/// Decoded envelope object plus field accessors.
#[derive(Debug, Clone)]
pub struct Envelope {
    fields: Map<String, Value>,
}

impl Envelope {
    /// Decode any of the three payload shapes into a non-empty object.
    pub fn decode(payload: &[u8]) -> Result<Self, PipelineError> {
        let value = decode_value(payload)?;
        let unwrapped = unwrap_legacy(value);
        match unwrapped {
            Value::Object(fields) if !fields.is_empty() => Ok(Self { fields }),
            Value::Object(_) => Err(PipelineError::MalformedEnvelope(
                "empty object after decode".to_string(),
            )),
            other => Err(PipelineError::MalformedEnvelope(format!(
                "expected object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Required string field; missing or non-string is a contract error.
    pub fn require_str(&self, key: &'static str) -> Result<String, PipelineError> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(PipelineError::MissingField(key))
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }
}

/// First layer: bytes → JSON value, trying raw JSON, then JSON-string
/// indirection, then whole-payload base64.
fn decode_value(payload: &[u8]) -> Result<Value, PipelineError> {
    if let Ok(value) = serde_json::from_slice::<Value>(payload) {
        return match value {
            Value::String(s) => decode_string_payload(&s),
            other => Ok(other),
        };
    }
    let text = std::str::from_utf8(payload)
        .map_err(|_| PipelineError::MalformedEnvelope("payload is not UTF-8".to_string()))?;
    decode_string_payload(text)
}

/// A string payload is either JSON itself or base64 of JSON.
fn decode_string_payload(text: &str) -> Result<Value, PipelineError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Ok(value);
        }
    }
    let decoded = BASE64
        .decode(trimmed)
        .map_err(|e| PipelineError::MalformedEnvelope(format!("not JSON or base64: {e}")))?;
    serde_json::from_slice(&decoded)
        .map_err(|e| PipelineError::MalformedEnvelope(format!("base64 payload is not JSON: {e}")))
}

/// Unwrap `{"message":{"data":"<base64>"}}`; on any inner failure the
/// outer object is kept as-is.
fn unwrap_legacy(value: Value) -> Value {
    let Some(data) = value
        .get("message")
        .and_then(|m| m.get("data"))
        .and_then(Value::as_str)
    else {
        return value;
    };
    match BASE64
        .decode(data)
        .ok()
        .filter(|bytes| !bytes.is_empty())
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
    {
        Some(inner) if inner.is_object() => inner,
        _ => value,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

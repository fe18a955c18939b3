//! Telephony provider client and phone-number handling.

pub mod webhook;

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::PipelineError;

/// Outbound-call provider. The webhook component receives the dialog
/// callbacks; this trait only starts calls.
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    /// Request an outbound call, handing the provider the voice URL on
    /// the webhook component. Returns the provider call SID.
    async fn create_call(
        &self,
        to: &str,
        from: &str,
        voice_url: &str,
    ) -> Result<String, PipelineError>;
}

/// Normalize a phone number to E.164, applying the default country
/// prefix when none is present.
pub fn normalize_e164(phone: &str, default_country_code: &str) -> String {
    let cleaned: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    if cleaned.starts_with('+') {
        return cleaned;
    }
    if let Some(rest) = cleaned.strip_prefix('0') {
        return format!("{default_country_code}{rest}");
    }
    if cleaned.len() == 10 {
        return format!("{default_country_code}{cleaned}");
    }
    format!("+{cleaned}")
}

/// REST provider client (Twilio-compatible call creation endpoint).
pub struct HttpTelephonyProvider {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
}

impl HttpTelephonyProvider {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
        }
    }
}

#[async_trait]
impl TelephonyProvider for HttpTelephonyProvider {
    async fn create_call(
        &self,
        to: &str,
        from: &str,
        voice_url: &str,
    ) -> Result<String, PipelineError> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Calls.json",
            self.account_sid
        );
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", from), ("Url", voice_url)])
            .send()
            .await
            .map_err(|e| PipelineError::Telephony(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PipelineError::Telephony(format!(
                "call creation returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Telephony(e.to_string()))?;
        body.get("sid")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Telephony("call response carried no sid".to_string()))
    }
}

/// Record of one simulated outbound call.
#[derive(Debug, Clone)]
pub struct SimulatedCall {
    pub sid: String,
    pub to: String,
    pub from: String,
    pub voice_url: String,
}

/// In-process provider for tests and local runs: mints SIDs and records
/// the requested calls.
#[derive(Default)]
pub struct SimulatedProvider {
    calls: Mutex<Vec<SimulatedCall>>,
    fail: bool,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that rejects every call request.
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<SimulatedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TelephonyProvider for SimulatedProvider {
    async fn create_call(
        &self,
        to: &str,
        from: &str,
        voice_url: &str,
    ) -> Result<String, PipelineError> {
        if self.fail {
            return Err(PipelineError::Telephony("provider rejected call".to_string()));
        }
        let sid = format!("CA{}", &uuid::Uuid::new_v4().simple().to_string()[..16]);
        let call = SimulatedCall {
            sid: sid.clone(),
            to: to.to_string(),
            from: from.to_string(),
            voice_url: voice_url.to_string(),
        };
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        Ok(sid)
    }
}

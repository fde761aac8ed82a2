//! Ceritain backend: realtime session issuance, usage metering, balance.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::http::{backend_headers, shared_client, status_to_error, ApiEnvelope};
use super::{BalanceSource, SessionIssuer, UsageReporter};
use crate::config::{trim_trailing_slash, CallConfig};
use crate::error::CallError;
use crate::types::{Locale, Participant, SessionCredential, SessionRequest, UsageReportOutcome};
use crate::util::timeout::with_timeout;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the Ceritain API.
#[derive(Debug, Clone)]
pub struct CeritainApi {
    base_url: String,
    session_url: String,
    locale: Locale,
    timeout: Duration,
}

impl CeritainApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let session_url = format!("{}/api/realtime/session", trim_trailing_slash(&base_url));
        Self {
            base_url,
            session_url,
            locale: Locale::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &CallConfig) -> Self {
        Self::new(config.api_base_url.clone())
            .with_session_url(config.session_url())
            .with_locale(config.locale)
            .with_timeout(config.request_timeout)
    }

    pub fn with_session_url(mut self, session_url: impl Into<String>) -> Self {
        self.session_url = session_url.into();
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", trim_trailing_slash(&self.base_url))
    }
}

#[derive(Debug, Deserialize)]
struct RealtimeSessionResult {
    id: Option<String>,
    client_secret: Option<ClientSecret>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: Option<String>,
    expires_at: Option<i64>,
}

#[async_trait]
impl SessionIssuer for CeritainApi {
    async fn issue(
        &self,
        request: &SessionRequest,
        bearer_token: Option<&str>,
    ) -> Result<SessionCredential, CallError> {
        let headers = backend_headers(bearer_token, self.locale);

        let body = with_timeout(self.timeout, async {
            let response = shared_client()
                .post(&self.session_url)
                .headers(headers)
                .json(request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(status_to_error(status.as_u16(), &body));
            }
            Ok(response.text().await?)
        })
        .await?;

        let envelope: ApiEnvelope<RealtimeSessionResult> = serde_json::from_str(&body)?;
        if !envelope.is_success() {
            return Err(CallError::Negotiation(format!("API Error: {}", envelope.message)));
        }

        let result = envelope.result;
        let session_id = result.as_ref().and_then(|r| r.id.clone());
        let client_secret = result.and_then(|r| r.client_secret);
        let expires_at = client_secret
            .as_ref()
            .and_then(|s| s.expires_at)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        let secret = client_secret
            .and_then(|s| s.value)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CallError::Negotiation(
                    "Invalid response: missing result.client_secret.value".into(),
                )
            })?;

        tracing::debug!(
            session_id = session_id.as_deref().unwrap_or("unknown"),
            expires_at = ?expires_at,
            "Realtime session created"
        );

        Ok(SessionCredential::new(secret)
            .with_session_id(session_id)
            .with_expires_at(expires_at))
    }
}

#[async_trait]
impl UsageReporter for CeritainApi {
    async fn report(
        &self,
        participant: Participant,
        bearer_token: &str,
        seconds: u64,
    ) -> UsageReportOutcome {
        let path = match participant {
            Participant::User => "/api/realtime/token-usage-user",
            Participant::Ai => "/api/realtime/token-usage-ai",
        };
        let url = self.url(path);
        let headers = backend_headers(Some(bearer_token), self.locale);

        let exchange = with_timeout(self.timeout, async {
            let response = shared_client()
                .post(url)
                .headers(headers)
                .json(&json!({ "time": seconds }))
                .send()
                .await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok((status, body))
        })
        .await;

        let outcome = match exchange {
            Ok((status, body)) => classify_usage_response(status, &body),
            Err(error) => UsageReportOutcome::transport(error.to_string()),
        };
        tracing::debug!(%participant, seconds, ?outcome, "Usage reported");
        outcome
    }
}

/// HTTP 400, or an envelope carrying error code 400, means the balance is gone.
fn classify_usage_response(status: u16, body: &str) -> UsageReportOutcome {
    if status == 400 {
        return UsageReportOutcome::Depleted;
    }
    match serde_json::from_str::<ApiEnvelope<Value>>(body) {
        Ok(envelope) if envelope.error_code == 400 => UsageReportOutcome::Depleted,
        Ok(envelope) if (200..300).contains(&status) && envelope.is_success() => {
            UsageReportOutcome::Ok
        }
        Ok(envelope) => UsageReportOutcome::transport(format!(
            "Usage report rejected (status {status}, code {}): {}",
            envelope.error_code, envelope.message
        )),
        Err(error) => UsageReportOutcome::transport(format!(
            "Malformed usage response (status {status}): {error}"
        )),
    }
}

#[async_trait]
impl BalanceSource for CeritainApi {
    async fn fetch_balance(&self, bearer_token: &str) -> Result<i64, CallError> {
        let url = self.url("/api/token");
        let headers = backend_headers(Some(bearer_token), self.locale);

        let (status, body) = with_timeout(self.timeout, async {
            let response = shared_client().get(url).headers(headers).send().await?;
            let status = response.status().as_u16();
            Ok((status, response.text().await?))
        })
        .await?;

        if !(200..300).contains(&status) {
            return Err(status_to_error(status, &body));
        }
        let envelope: ApiEnvelope<serde_json::Number> = serde_json::from_str(&body)?;
        if !envelope.is_success() {
            let message = if envelope.message.is_empty() {
                "Failed to get token".to_string()
            } else {
                envelope.message
            };
            return Err(CallError::api(status, message));
        }
        envelope
            .result
            .and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)))
            .ok_or_else(|| CallError::api(status, "Invalid response: missing token balance"))
    }
}

//! Offer/answer exchange with the realtime endpoint.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use super::http::shared_client;
use super::Negotiator;
use crate::config::{CallConfig, DEFAULT_NEGOTIATION_URL, DEFAULT_REALTIME_MODEL};
use crate::error::CallError;
use crate::types::SessionCredential;

/// Posts the local SDP offer and returns the remote SDP answer.
///
/// No timeout is applied here; the connection bounds the whole exchange.
#[derive(Debug, Clone)]
pub struct RealtimeNegotiator {
    url: String,
    model: String,
}

impl Default for RealtimeNegotiator {
    fn default() -> Self {
        Self::new(DEFAULT_NEGOTIATION_URL, DEFAULT_REALTIME_MODEL)
    }
}

impl RealtimeNegotiator {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &CallConfig) -> Self {
        Self::new(config.negotiation_url.clone(), config.model.clone())
    }

    fn endpoint(&self) -> Result<reqwest::Url, CallError> {
        let mut url = reqwest::Url::parse(self.url.trim()).map_err(|e| {
            CallError::Configuration(format!("Invalid negotiation URL '{}': {e}", self.url))
        })?;
        url.query_pairs_mut().append_pair("model", &self.model);
        Ok(url)
    }
}

#[async_trait]
impl Negotiator for RealtimeNegotiator {
    async fn exchange(
        &self,
        offer_sdp: &str,
        credential: SessionCredential,
    ) -> Result<String, CallError> {
        let url = self.endpoint()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/sdp"));
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", credential.into_secret()))
            .map_err(|e| CallError::Negotiation(format!("Invalid session credential: {e}")))?;
        headers.insert(AUTHORIZATION, auth);

        let response = shared_client()
            .post(url)
            .headers(headers)
            .body(offer_sdp.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "SDP exchange rejected");
            return Err(CallError::Negotiation(format!(
                "SDP failed: {} {body}",
                status.as_u16()
            )));
        }
        if body.trim().is_empty() {
            return Err(CallError::Negotiation("SDP failed: empty answer".into()));
        }
        tracing::debug!(answer_bytes = body.len(), "Received SDP answer");
        Ok(body)
    }
}

//! Realtime session request and the short-lived credential it yields.

use std::fmt;

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Default persona prompt for the companion.
pub const DEFAULT_PROMPT: &str = "jadi seorang psikolog yang membantu menyelesaikan masalah user";

/// Voices the realtime endpoint can speak with.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

/// Payload sent to the credential issuance endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct SessionRequest {
    #[builder(into, default = DEFAULT_PROMPT.to_string())]
    pub prompt: String,
    #[builder(default)]
    pub voice: Voice,
}

impl Default for SessionRequest {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Opaque short-lived secret that authorizes one negotiation exchange.
///
/// Not `Clone`: it is moved into the exchange and dropped with it. `Debug`
/// never prints the secret.
pub struct SessionCredential {
    secret: String,
    session_id: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl SessionCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            session_id: None,
            expires_at: None,
        }
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Server-side expiry. Informational only; a stale secret is rejected remotely.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Consume the credential, yielding the bearer secret.
    pub fn into_secret(self) -> String {
        self.secret
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("secret", &"<redacted>")
            .field("session_id", &self.session_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

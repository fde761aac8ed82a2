//! Connection status and the observable call snapshot.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::error::RecoverySuggestion;

/// Lifecycle state of the call.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    /// Whether `connect` may start a fresh attempt from this state.
    pub fn can_connect(self) -> bool {
        !matches!(self, Self::Connecting)
    }
}

/// Affordance the UI should render. At most one applies at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attention {
    TopUp,
    /// Microphone access was refused; a retry needs a fresh grant.
    GrantMicrophone { message: String },
    Retry { message: String },
}

/// Render state of the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallSnapshot {
    pub status: ConnectionStatus,
    pub error: Option<String>,
    /// Recovery for the failure behind an `error` status.
    pub recovery: Option<RecoverySuggestion>,
    pub transcript: String,
    pub ai_response: String,
    pub is_muted: bool,
    pub audio_level: f32,
    pub is_user_speaking: bool,
    pub is_ai_speaking: bool,
    pub depleted: bool,
}

impl CallSnapshot {
    /// Depletion takes priority over a technical error.
    pub fn attention(&self) -> Option<Attention> {
        if self.depleted {
            return Some(Attention::TopUp);
        }
        if self.status != ConnectionStatus::Error {
            return None;
        }
        let message = self
            .error
            .clone()
            .unwrap_or_else(|| "Connection failed".to_string());
        match self.recovery {
            Some(RecoverySuggestion::GrantMicrophone) => {
                Some(Attention::GrantMicrophone { message })
            }
            _ => Some(Attention::Retry { message }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depletion_wins_over_error() {
        let snapshot = CallSnapshot {
            status: ConnectionStatus::Error,
            error: Some("SDP failed".into()),
            depleted: true,
            ..Default::default()
        };
        assert_eq!(snapshot.attention(), Some(Attention::TopUp));
    }

    #[test]
    fn error_status_offers_retry_with_message() {
        let snapshot = CallSnapshot {
            status: ConnectionStatus::Error,
            error: Some("SDP failed: 401".into()),
            ..Default::default()
        };
        assert_eq!(
            snapshot.attention(),
            Some(Attention::Retry {
                message: "SDP failed: 401".into()
            })
        );
        assert_eq!(CallSnapshot::default().attention(), None);
    }

    #[test]
    fn denied_microphone_asks_for_a_grant_instead_of_retry() {
        let snapshot = CallSnapshot {
            status: ConnectionStatus::Error,
            error: Some("Microphone permission denied".into()),
            recovery: Some(RecoverySuggestion::GrantMicrophone),
            ..Default::default()
        };
        assert_eq!(
            snapshot.attention(),
            Some(Attention::GrantMicrophone {
                message: "Microphone permission denied".into()
            })
        );
    }

    #[test]
    fn status_displays_lowercase() {
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
        assert!(!ConnectionStatus::Connecting.can_connect());
        assert!(ConnectionStatus::Error.can_connect());
    }
}

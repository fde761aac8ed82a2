//! Error types for call setup, signaling, and usage accounting.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all call operations.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Control channel error: {0}")]
    Channel(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Token balance depleted")]
    UsageDepleted,

    #[error("Usage report failed: {0}")]
    UsageTransport(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Connection attempt cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CallError {
    /// Create an API error from a status code and response body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PermissionDenied(_) => ErrorCategory::Permission,
            Self::Negotiation(_) | Self::Api { .. } | Self::Serialization(_) => {
                ErrorCategory::Negotiation
            }
            Self::Network(_) | Self::Io(_) | Self::UsageTransport(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Channel(_) => ErrorCategory::Channel,
            Self::Media(_) => ErrorCategory::Media,
            Self::UsageDepleted => ErrorCategory::Depleted,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::InvalidState(_) | Self::Cancelled => ErrorCategory::Unknown,
        }
    }

    /// Whether a fresh connect attempt can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Negotiation
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Channel
                | ErrorCategory::Media
        )
    }

    /// Suggest the affordance the UI should offer.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Permission => RecoverySuggestion::GrantMicrophone,
            ErrorCategory::Depleted => RecoverySuggestion::TopUp,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Negotiation
            | ErrorCategory::Network
            | ErrorCategory::Timeout
            | ErrorCategory::Channel
            | ErrorCategory::Media => RecoverySuggestion::Retry,
            ErrorCategory::Unknown => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CallError>;

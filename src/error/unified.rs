//! Error classification and recovery.

use serde::{Deserialize, Serialize};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Permission,
    Negotiation,
    Network,
    Timeout,
    Channel,
    Media,
    Depleted,
    Configuration,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoverySuggestion {
    /// Change host settings to allow microphone access, then retry.
    GrantMicrophone,
    /// Start a fresh connect attempt.
    Retry,
    /// Top up the token balance.
    TopUp,
    CheckConfiguration,
    ContactSupport,
}

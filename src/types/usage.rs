//! Outcome of reporting a speaking interval to the billing backend.

use serde::{Deserialize, Serialize};

/// Result of one usage report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UsageReportOutcome {
    /// The backend accepted the duration.
    Ok,
    /// The balance is exhausted; the call must end.
    Depleted,
    /// The report could not be delivered. Accounting is best-effort.
    TransportError { message: String },
}

impl UsageReportOutcome {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
        }
    }

    pub fn is_depleted(&self) -> bool {
        matches!(self, Self::Depleted)
    }
}

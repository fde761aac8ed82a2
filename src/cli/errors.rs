//! CLI-specific error formatting for user-facing messages.

use crate::error::{CallError, RecoverySuggestion};

/// Map a [`CallError`] to a user-facing help string with actionable guidance.
pub fn format_error_help(err: &CallError) -> String {
    match err.recovery_suggestion() {
        RecoverySuggestion::TopUp => {
            format!("{err}. Top up your token balance to continue.")
        }
        RecoverySuggestion::GrantMicrophone => {
            format!("{err}. Allow microphone access in your system settings, then retry.")
        }
        RecoverySuggestion::CheckConfiguration => {
            format!("{err}. Check your config file or CERITAIN_* environment variables.")
        }
        RecoverySuggestion::Retry => match err {
            CallError::Api { status: 401, .. } => {
                format!("{err}. Run: ceritain-call auth login --token <token> --email <email>")
            }
            _ => format!("{err}. Please try again."),
        },
        RecoverySuggestion::ContactSupport => format!("{err}"),
    }
}

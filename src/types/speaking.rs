//! Speaking transitions emitted for the local and remote participant.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Which side of the call is speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Participant {
    User,
    Ai,
}

/// A confirmed edge of a speaking interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpeakingTransition {
    Started,
    Stopped { duration_seconds: u64 },
}

/// A transition tagged with the participant it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakingEvent {
    pub participant: Participant,
    pub transition: SpeakingTransition,
}

impl SpeakingEvent {
    pub fn new(participant: Participant, transition: SpeakingTransition) -> Self {
        Self {
            participant,
            transition,
        }
    }
}

/// Whole seconds of an interval, rounding half up.
pub fn rounded_seconds(elapsed: Duration) -> u64 {
    let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    millis.saturating_add(500) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(rounded_seconds(Duration::from_millis(0)), 0);
        assert_eq!(rounded_seconds(Duration::from_millis(499)), 0);
        assert_eq!(rounded_seconds(Duration::from_millis(500)), 1);
        assert_eq!(rounded_seconds(Duration::from_millis(2_400)), 2);
        assert_eq!(rounded_seconds(Duration::from_millis(3_900)), 4);
    }

    #[test]
    fn participant_displays_lowercase() {
        assert_eq!(Participant::Ai.to_string(), "ai");
        assert_eq!(Participant::User.as_ref(), "user");
    }
}

//! Energy-based voice activity detection for the local participant.
//!
//! `Silent -> Speaking` requires the level to stay above the threshold for
//! `min_speaking_duration`; `Speaking -> Silent` requires `silence_duration`
//! measured from the last tick that was above the threshold, so the result
//! does not depend on the tick rate.

use std::time::Duration;

use tokio::time::Instant;

use crate::types::{rounded_seconds, SpeakingTransition};

/// Detection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadConfig {
    /// Normalized level (0-1) above which a tick counts as sound.
    pub energy_threshold: f32,
    /// Sound must persist this long before a start is confirmed. Zero
    /// confirms on the first loud tick.
    pub min_speaking_duration: Duration,
    /// Sustained silence required before a stop is confirmed.
    pub silence_duration: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.02,
            min_speaking_duration: Duration::from_millis(300),
            silence_duration: Duration::from_millis(1500),
        }
    }
}

/// Local speaking state machine. Feed it one level per tick.
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    config: VadConfig,
    /// First loud tick of a run that has not been confirmed yet.
    onset: Option<Instant>,
    /// Confirmed start of the open interval.
    started_at: Option<Instant>,
    last_sound: Option<Instant>,
}

impl VoiceActivityDetector {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            onset: None,
            started_at: None,
            last_sound: None,
        }
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    pub fn is_speaking(&self) -> bool {
        self.started_at.is_some()
    }

    /// Process one tick. Muted ticks are not analyzed and never fire.
    pub fn observe(&mut self, level: f32, muted: bool, now: Instant) -> Option<SpeakingTransition> {
        if muted {
            self.onset = None;
            return None;
        }

        if level > self.config.energy_threshold {
            self.last_sound = Some(now);
            if self.started_at.is_some() {
                return None;
            }
            let onset = *self.onset.get_or_insert(now);
            if now.saturating_duration_since(onset) < self.config.min_speaking_duration {
                return None;
            }
            self.onset = None;
            self.started_at = Some(now);
            return Some(SpeakingTransition::Started);
        }

        self.onset = None;
        let (started_at, last_sound) = (self.started_at?, self.last_sound?);
        if now.saturating_duration_since(last_sound) < self.config.silence_duration {
            return None;
        }
        self.started_at = None;
        Some(SpeakingTransition::Stopped {
            duration_seconds: rounded_seconds(now.saturating_duration_since(started_at)),
        })
    }

    /// Drop any open or pending interval without emitting a stop.
    pub fn reset(&mut self) {
        self.onset = None;
        self.started_at = None;
        self.last_sound = None;
    }
}

impl Default for VoiceActivityDetector {
    fn default() -> Self {
        Self::new(VadConfig::default())
    }
}

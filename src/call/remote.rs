//! Remote participant speech inference from control-channel events.
//!
//! No raw remote audio is analyzed; the first start cue opens an interval
//! and the first stop cue after it closes the interval.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::events::{ServerEvent, SpeechCue};
use crate::media::ChannelEvent;
use crate::types::{rounded_seconds, SpeakingTransition};

#[derive(Debug, Default, Clone)]
pub struct RemoteSpeechDetector {
    started_at: Option<Instant>,
}

impl RemoteSpeechDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_speaking(&self) -> bool {
        self.started_at.is_some()
    }

    /// Process one raw channel message. Unparseable input is ignored.
    pub fn observe(&mut self, raw: &str, now: Instant) -> Option<SpeakingTransition> {
        let event = ServerEvent::parse(raw)?;
        self.observe_event(&event, now)
    }

    pub fn observe_event(
        &mut self,
        event: &ServerEvent,
        now: Instant,
    ) -> Option<SpeakingTransition> {
        match event.speech_cue()? {
            SpeechCue::Start => {
                if self.started_at.is_some() {
                    return None;
                }
                self.started_at = Some(now);
                Some(SpeakingTransition::Started)
            }
            SpeechCue::Stop => {
                let started_at = self.started_at.take()?;
                Some(SpeakingTransition::Stopped {
                    duration_seconds: rounded_seconds(now.saturating_duration_since(started_at)),
                })
            }
        }
    }

    pub fn reset(&mut self) {
        self.started_at = None;
    }

    /// Listen on `events` until detached or the channel closes, reporting
    /// every transition to `on_transition`.
    pub fn attach<F>(
        events: broadcast::Receiver<ChannelEvent>,
        on_transition: F,
    ) -> RemoteSpeechSubscription
    where
        F: FnMut(SpeakingTransition) + Send + 'static,
    {
        let task = tokio::spawn(run_detector(events, on_transition));
        RemoteSpeechSubscription { task: Some(task) }
    }
}

async fn run_detector<F>(mut events: broadcast::Receiver<ChannelEvent>, mut on_transition: F)
where
    F: FnMut(SpeakingTransition) + Send + 'static,
{
    let mut detector = RemoteSpeechDetector::new();
    loop {
        match events.recv().await {
            Ok(ChannelEvent::Message(raw)) => {
                if let Some(transition) = detector.observe(&raw, Instant::now()) {
                    on_transition(transition);
                }
            }
            Ok(ChannelEvent::Closed) | Err(RecvError::Closed) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Remote speech detector lagged behind control channel");
            }
        }
    }
}

/// A running detector attached to one channel listener.
///
/// Detaching drops only this listener; the channel and its other listeners
/// are unaffected.
#[derive(Debug)]
pub struct RemoteSpeechSubscription {
    task: Option<JoinHandle<()>>,
}

impl RemoteSpeechSubscription {
    pub fn is_attached(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop listening. Idempotent.
    pub fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for RemoteSpeechSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{ChannelHub, DataChannel};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const AUDIO_DELTA: &str = r#"{"type":"response.audio.delta","delta":"AAA="}"#;
    const TRANSCRIPT_DELTA: &str = r#"{"type":"response.audio_transcript.delta","delta":"Ha"}"#;
    const AUDIO_DONE: &str = r#"{"type":"response.audio.done"}"#;
    const RESPONSE_DONE: &str = r#"{"type":"response.done","response":{}}"#;

    #[test]
    fn first_start_and_first_stop_delimit_the_interval() {
        let mut detector = RemoteSpeechDetector::new();
        let t0 = Instant::now();

        assert_eq!(detector.observe(TRANSCRIPT_DELTA, t0), Some(SpeakingTransition::Started));
        assert_eq!(detector.observe(AUDIO_DELTA, t0 + Duration::from_millis(500)), None);
        assert_eq!(
            detector.observe(AUDIO_DONE, t0 + Duration::from_millis(2_600)),
            Some(SpeakingTransition::Stopped { duration_seconds: 3 })
        );
        assert_eq!(detector.observe(RESPONSE_DONE, t0 + Duration::from_secs(3)), None);
    }

    #[test]
    fn stop_without_start_is_ignored() {
        let mut detector = RemoteSpeechDetector::new();
        assert_eq!(detector.observe(RESPONSE_DONE, Instant::now()), None);
        assert!(!detector.is_speaking());
    }

    #[test]
    fn garbage_does_not_disturb_an_open_interval() {
        let mut detector = RemoteSpeechDetector::new();
        let t0 = Instant::now();
        detector.observe(AUDIO_DELTA, t0);
        assert_eq!(detector.observe("{oops", t0), None);
        assert_eq!(detector.observe(r#"{"type":"rate_limits.updated"}"#, t0), None);
        assert!(detector.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn attached_detector_follows_channel_and_detaches_cleanly() {
        let hub = Arc::new(ChannelHub::new("oai-events"));
        let mut other = hub.subscribe();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut subscription =
            RemoteSpeechDetector::attach(hub.subscribe(), move |t| sink.lock().unwrap().push(t));

        hub.open();
        hub.deliver(AUDIO_DELTA);
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        hub.deliver(RESPONSE_DONE);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                SpeakingTransition::Started,
                SpeakingTransition::Stopped { duration_seconds: 1 }
            ]
        );

        subscription.detach();
        subscription.detach();
        tokio::task::yield_now().await;
        hub.deliver(AUDIO_DELTA);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(!subscription.is_attached());
        // The other listener still receives everything.
        assert_eq!(other.recv().await.unwrap(), ChannelEvent::Open);
    }
}

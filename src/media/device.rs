//! Microphone capture and remote audio playback.

use std::sync::Arc;

use async_trait::async_trait;

use super::analyser::AudioAnalyser;
use super::peer::RemoteAudioTrack;
use crate::error::CallError;

/// A live local capture track.
pub trait LocalAudioTrack: Send + Sync {
    fn id(&self) -> &str;

    /// Enabled tracks carry audio; a disabled track is muted.
    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    /// Stop capture and release the device. Idempotent.
    fn stop(&self);
}

/// Access to the host's capture devices.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Prompt for and open the microphone.
    ///
    /// Denial must surface as [`CallError::PermissionDenied`].
    async fn request_microphone(&self) -> Result<LocalAudioStream, CallError>;
}

/// Output for incoming remote audio; plays as soon as a track is attached.
pub trait AudioSink: Send + Sync {
    fn attach(&self, track: RemoteAudioTrack) -> Result<(), CallError>;
}

/// Captured microphone stream with its analysis node.
#[derive(Clone)]
pub struct LocalAudioStream {
    tracks: Vec<Arc<dyn LocalAudioTrack>>,
    analyser: Arc<dyn AudioAnalyser>,
}

impl LocalAudioStream {
    pub fn new(tracks: Vec<Arc<dyn LocalAudioTrack>>, analyser: Arc<dyn AudioAnalyser>) -> Self {
        Self { tracks, analyser }
    }

    pub fn tracks(&self) -> &[Arc<dyn LocalAudioTrack>] {
        &self.tracks
    }

    /// The track whose enabled flag is the mute state.
    pub fn primary_track(&self) -> Option<&Arc<dyn LocalAudioTrack>> {
        self.tracks.first()
    }

    pub fn analyser(&self) -> &Arc<dyn AudioAnalyser> {
        &self.analyser
    }

    /// Stop every track and close the analysis context.
    pub fn release(&self) {
        for track in &self.tracks {
            track.stop();
        }
        self.analyser.close();
    }
}

impl std::fmt::Debug for LocalAudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAudioStream")
            .field(
                "tracks",
                &self.tracks.iter().map(|t| t.id().to_string()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

//! Peer connection primitive and session descriptions.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::channel::DataChannel;
use super::device::LocalAudioTrack;
use crate::error::CallError;

/// Offer or answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// A session description exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Incoming audio from the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAudioTrack {
    pub id: String,
    pub stream_id: Option<String>,
}

/// Invoked for every remote track the peer connection receives.
pub type RemoteTrackHandler = Arc<dyn Fn(RemoteAudioTrack) + Send + Sync>;

/// A peer-to-peer media connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn add_track(&self, track: Arc<dyn LocalAudioTrack>) -> Result<(), CallError>;

    /// Declare a receive-only audio transceiver.
    fn add_receive_only_audio(&self) -> Result<(), CallError>;

    fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>, CallError>;

    async fn create_offer(&self) -> Result<SessionDescription, CallError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), CallError>;

    async fn set_remote_description(&self, description: SessionDescription)
        -> Result<(), CallError>;

    /// Close the connection. Idempotent; does not wait for acknowledgement.
    fn close(&self);
}

/// Creates peer connections wired to a remote track handler.
pub trait PeerConnectionFactory: Send + Sync {
    fn create(&self, on_remote_track: RemoteTrackHandler)
        -> Result<Arc<dyn PeerConnection>, CallError>;
}

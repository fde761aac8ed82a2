//! Host media primitives: microphone capture, audio analysis, peer
//! connection, and the control data channel.
//!
//! The call core only talks to these traits. A host (native WebRTC stack,
//! browser bindings, or an in-memory test double) implements them.

pub mod analyser;
pub mod channel;
pub mod device;
pub mod peer;

pub use analyser::{AudioAnalyser, PcmAnalyser};
pub use channel::{ChannelEvent, ChannelHub, DataChannel};
pub use device::{AudioSink, LocalAudioStream, LocalAudioTrack, MediaDevices};
pub use peer::{
    PeerConnection, PeerConnectionFactory, RemoteAudioTrack, RemoteTrackHandler, SdpType,
    SessionDescription,
};

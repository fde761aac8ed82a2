//! Convenience re-exports for common use.

pub use crate::auth::{AuthContext, StaticToken, TokenProvider};
pub use crate::backend::{CeritainApi, RealtimeNegotiator};
pub use crate::call::{
    Attention, CallBackends, CallEvent, CallSnapshot, ConnectionDeps, ConnectionStatus,
    RealtimeCallController, VadConfig,
};
pub use crate::config::CallConfig;
pub use crate::error::{CallError, Result};
pub use crate::media::{
    AudioAnalyser, AudioSink, ChannelHub, DataChannel, LocalAudioStream, LocalAudioTrack,
    MediaDevices, PcmAnalyser, PeerConnection, PeerConnectionFactory,
};
pub use crate::types::{
    Locale, Participant, SessionRequest, SpeakingEvent, SpeakingTransition, UsageReportOutcome,
    Voice,
};

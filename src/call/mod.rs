//! Realtime voice call core: level monitoring, speech detection, the
//! session connection, and the controller that meters usage.

pub mod connection;
pub mod controller;
pub mod events;
pub mod level;
pub mod publisher;
pub mod remote;
pub mod status;
pub mod vad;

pub use connection::{ConnectionDeps, SessionConnection};
pub use controller::{CallBackends, RealtimeCallController};
pub use events::{CallEvent, ServerEvent, SpeechCue};
pub use level::{compute_level, AudioLevelMonitor, LevelMonitorHandle};
pub use publisher::CallPublisher;
pub use remote::{RemoteSpeechDetector, RemoteSpeechSubscription};
pub use status::{Attention, CallSnapshot, ConnectionStatus};
pub use vad::{VadConfig, VoiceActivityDetector};

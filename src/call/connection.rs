//! Lifecycle of one peer-to-peer call resource set.
//!
//! Every `connect` starts a new attempt. Resources acquired by an attempt
//! are adopted into the shared set only while that attempt is still
//! current; a teardown bumps the attempt counter under the same lock, so a
//! stale attempt that resumes after an await releases what it holds and
//! returns [`CallError::Cancelled`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::events::{CallEvent, ServerEvent};
use super::level::{AudioLevelMonitor, LevelMonitorHandle};
use super::publisher::CallPublisher;
use super::remote::{RemoteSpeechDetector, RemoteSpeechSubscription};
use super::status::ConnectionStatus;
use super::vad::VoiceActivityDetector;
use crate::backend::Negotiator;
use crate::config::CallConfig;
use crate::error::{CallError, Result};
use crate::media::{
    AudioSink, ChannelEvent, DataChannel, LocalAudioStream, MediaDevices, PeerConnection,
    PeerConnectionFactory, RemoteAudioTrack, RemoteTrackHandler, SessionDescription,
};
use crate::types::{Participant, SessionCredential, SpeakingEvent, SpeakingTransition};
use crate::util::timeout::with_timeout;

/// Host primitives and the negotiation collaborator a connection needs.
#[derive(Clone)]
pub struct ConnectionDeps {
    pub devices: Arc<dyn MediaDevices>,
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub audio_sink: Arc<dyn AudioSink>,
    pub negotiator: Arc<dyn Negotiator>,
}

impl std::fmt::Debug for ConnectionDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDeps").finish_non_exhaustive()
    }
}

/// Owns the peer connection, microphone, level monitor, control channel and
/// remote speech detector of the active call.
#[derive(Clone)]
pub struct SessionConnection {
    shared: Arc<Shared>,
}

struct Shared {
    deps: ConnectionDeps,
    cadence: Duration,
    label: String,
    negotiation_timeout: Duration,
    publisher: CallPublisher,
    speaking_tx: mpsc::UnboundedSender<SpeakingEvent>,
    attempt: AtomicU64,
    resources: Mutex<Resources>,
    vad: Mutex<VoiceActivityDetector>,
}

#[derive(Default)]
struct Resources {
    peer: Option<Arc<dyn PeerConnection>>,
    stream: Option<LocalAudioStream>,
    channel: Option<Arc<dyn DataChannel>>,
    monitor: Option<LevelMonitorHandle>,
    remote: Option<RemoteSpeechSubscription>,
    channel_task: Option<JoinHandle<()>>,
}

impl Resources {
    fn is_empty(&self) -> bool {
        self.peer.is_none()
            && self.stream.is_none()
            && self.channel.is_none()
            && self.monitor.is_none()
            && self.remote.is_none()
            && self.channel_task.is_none()
    }

    fn merge(&mut self, staged: Resources) {
        let Resources {
            peer,
            stream,
            channel,
            monitor,
            remote,
            channel_task,
        } = staged;
        if peer.is_some() {
            self.peer = peer;
        }
        if stream.is_some() {
            self.stream = stream;
        }
        if channel.is_some() {
            self.channel = channel;
        }
        if monitor.is_some() {
            self.monitor = monitor;
        }
        if remote.is_some() {
            self.remote = remote;
        }
        if channel_task.is_some() {
            self.channel_task = channel_task;
        }
    }

    /// Release in dependency order: consumers before the things they read.
    fn release(self) {
        let Resources {
            peer,
            stream,
            channel,
            monitor,
            remote,
            channel_task,
        } = self;
        if let Some(mut monitor) = monitor {
            monitor.stop();
        }
        if let Some(mut remote) = remote {
            remote.detach();
        }
        if let Some(task) = channel_task {
            task.abort();
        }
        if let Some(channel) = channel {
            channel.close();
        }
        if let Some(peer) = peer {
            peer.close();
        }
        if let Some(stream) = stream {
            stream.release();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionConnection {
    pub fn new(
        deps: ConnectionDeps,
        config: &CallConfig,
        publisher: CallPublisher,
        speaking_tx: mpsc::UnboundedSender<SpeakingEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                deps,
                cadence: config.level_cadence,
                label: config.data_channel_label.clone(),
                negotiation_timeout: config.negotiation_timeout,
                publisher,
                speaking_tx,
                attempt: AtomicU64::new(0),
                resources: Mutex::new(Resources::default()),
                vad: Mutex::new(VoiceActivityDetector::new(config.vad)),
            }),
        }
    }

    pub fn publisher(&self) -> &CallPublisher {
        &self.shared.publisher
    }

    /// Whether any call resource is currently held.
    pub fn has_session(&self) -> bool {
        !lock(&self.shared.resources).is_empty()
    }

    /// Establish a call authorized by `credential`.
    ///
    /// Resolves once the control channel reports open. Any failure tears
    /// down everything acquired so far and leaves the status at `error`.
    /// A previous session held by this connection is released first.
    pub async fn connect(&self, credential: SessionCredential) -> Result<()> {
        let attempt = self.begin();
        self.run(attempt, async move { Ok(credential) }).await
    }

    /// Release any previous session and enter `connecting`.
    pub(crate) fn begin(&self) -> u64 {
        self.shared.begin_attempt()
    }

    /// Drive `attempt` to completion once its credential resolves.
    pub(crate) async fn run<F>(&self, attempt: u64, credential: F) -> Result<()>
    where
        F: Future<Output = Result<SessionCredential>>,
    {
        let span = tracing::debug_span!("call_connect", call_id = %Uuid::new_v4(), attempt);
        let outcome = async {
            let credential = credential.await?;
            self.shared.ensure_current(attempt)?;
            self.establish(attempt, credential).await
        }
        .instrument(span)
        .await;

        match outcome {
            Ok(()) => Ok(()),
            Err(CallError::Cancelled) => {
                tracing::debug!(attempt, "Connect attempt superseded");
                Err(CallError::Cancelled)
            }
            Err(error) => {
                if self.shared.teardown_if_current(attempt) {
                    tracing::warn!(%error, "Connect failed");
                    self.shared.publisher.fail(&error);
                }
                Err(error)
            }
        }
    }

    async fn establish(&self, attempt: u64, credential: SessionCredential) -> Result<()> {
        let shared = &self.shared;

        let sink = Arc::clone(&shared.deps.audio_sink);
        let on_remote_track: RemoteTrackHandler = Arc::new(move |track: RemoteAudioTrack| {
            let id = track.id.clone();
            match sink.attach(track) {
                Ok(()) => tracing::debug!(track = %id, "Remote audio attached"),
                Err(error) => tracing::warn!(track = %id, %error, "Failed to attach remote audio"),
            }
        });
        let peer = shared.deps.peers.create(on_remote_track)?;
        shared.adopt(
            attempt,
            Resources {
                peer: Some(Arc::clone(&peer)),
                ..Default::default()
            },
        )?;

        tracing::debug!("Requesting microphone");
        let stream = shared.deps.devices.request_microphone().await?;
        shared.adopt(
            attempt,
            Resources {
                stream: Some(stream.clone()),
                ..Default::default()
            },
        )?;

        for track in stream.tracks() {
            peer.add_track(Arc::clone(track))?;
        }
        peer.add_receive_only_audio()?;
        let primary = stream
            .primary_track()
            .cloned()
            .ok_or_else(|| CallError::Media("Microphone stream has no audio track".into()))?;
        let muted = !primary.is_enabled();
        shared.publisher.update(|snapshot| snapshot.is_muted = muted);

        let weak = Arc::downgrade(shared);
        let monitor = AudioLevelMonitor::new(Arc::clone(stream.analyser()), shared.cadence).start(
            move |level| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_local_level(attempt, level, !primary.is_enabled());
                }
            },
        );
        shared.adopt(
            attempt,
            Resources {
                monitor: Some(monitor),
                ..Default::default()
            },
        )?;

        let channel = peer.create_data_channel(&shared.label)?;
        let mut opened = channel.subscribe();
        let weak = Arc::downgrade(shared);
        let remote = RemoteSpeechDetector::attach(channel.subscribe(), move |transition| {
            if let Some(shared) = weak.upgrade() {
                shared.on_remote_transition(attempt, transition);
            }
        });
        let channel_task = tokio::spawn(pump_channel(
            Arc::downgrade(shared),
            attempt,
            channel.subscribe(),
        ));
        shared.adopt(
            attempt,
            Resources {
                channel: Some(channel),
                remote: Some(remote),
                channel_task: Some(channel_task),
                ..Default::default()
            },
        )?;

        let offer = peer.create_offer().await?;
        shared.ensure_current(attempt)?;
        let offer_sdp = offer.sdp.clone();
        peer.set_local_description(offer).await?;
        shared.ensure_current(attempt)?;

        tracing::debug!("Exchanging session offer");
        let answer = with_timeout(
            shared.negotiation_timeout,
            shared.deps.negotiator.exchange(&offer_sdp, credential),
        )
        .await?;
        shared.ensure_current(attempt)?;
        peer.set_remote_description(SessionDescription::answer(answer))
            .await?;
        shared.ensure_current(attempt)?;

        with_timeout(shared.negotiation_timeout, wait_for_open(&mut opened)).await?;
        shared.mark_connected(attempt)
    }

    /// Release every resource and move to `disconnected`.
    ///
    /// Safe at any point, including before the first connect, mid-connect,
    /// and repeatedly. Never waits on the released resources.
    pub fn disconnect(&self) {
        self.shared.teardown();
        self.shared.publisher.set_status(ConnectionStatus::Disconnected);
    }

    /// Flip the primary track's enabled flag. `None` when no microphone is
    /// held.
    pub fn toggle_mute(&self) -> Option<bool> {
        let resources = lock(&self.shared.resources);
        let stream = resources.stream.as_ref()?;
        let muted = stream.primary_track()?.is_enabled();
        Some(self.shared.apply_mute(stream, muted))
    }

    /// Enable or disable every local track. `None` when no microphone is held.
    pub fn set_muted(&self, muted: bool) -> Option<bool> {
        let resources = lock(&self.shared.resources);
        let stream = resources.stream.as_ref()?;
        Some(self.shared.apply_mute(stream, muted))
    }

    /// Read from the primary track; `false` without a microphone.
    pub fn is_muted(&self) -> bool {
        let resources = lock(&self.shared.resources);
        resources
            .stream
            .as_ref()
            .and_then(LocalAudioStream::primary_track)
            .is_some_and(|track| !track.is_enabled())
    }
}

impl std::fmt::Debug for SessionConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConnection")
            .field("attempt", &self.shared.attempt.load(Ordering::Acquire))
            .field("status", &self.shared.publisher.status())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn apply_mute(&self, stream: &LocalAudioStream, muted: bool) -> bool {
        for track in stream.tracks() {
            track.set_enabled(!muted);
        }
        self.publisher.update(|snapshot| snapshot.is_muted = muted);
        tracing::debug!(muted, "Microphone mute changed");
        muted
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.attempt.load(Ordering::Acquire) == attempt
    }

    fn ensure_current(&self, attempt: u64) -> Result<()> {
        if self.is_current(attempt) {
            Ok(())
        } else {
            Err(CallError::Cancelled)
        }
    }

    /// Release any previous session and start a new attempt.
    fn begin_attempt(&self) -> u64 {
        let (attempt, released) = self.teardown();
        if released {
            self.publisher.set_status(ConnectionStatus::Disconnected);
        }
        self.publisher.update(|snapshot| {
            snapshot.error = None;
            snapshot.recovery = None;
            snapshot.transcript.clear();
            snapshot.ai_response.clear();
        });
        self.publisher.set_status(ConnectionStatus::Connecting);
        attempt
    }

    /// Keep `staged` if `attempt` is still current, otherwise release it.
    fn adopt(&self, attempt: u64, staged: Resources) -> Result<()> {
        let mut resources = lock(&self.resources);
        if !self.is_current(attempt) {
            drop(resources);
            staged.release();
            return Err(CallError::Cancelled);
        }
        resources.merge(staged);
        Ok(())
    }

    fn mark_connected(&self, attempt: u64) -> Result<()> {
        let _resources = lock(&self.resources);
        self.ensure_current(attempt)?;
        self.publisher.set_status(ConnectionStatus::Connected);
        tracing::info!("Call connected");
        Ok(())
    }

    /// Invalidate the current attempt and release its resources. Returns the
    /// new attempt number and whether anything was held.
    fn teardown(&self) -> (u64, bool) {
        self.teardown_matching(None).unwrap_or_default()
    }

    fn teardown_if_current(&self, attempt: u64) -> bool {
        self.teardown_matching(Some(attempt)).is_some()
    }

    fn teardown_matching(&self, expected: Option<u64>) -> Option<(u64, bool)> {
        let (attempt, resources) = {
            let mut guard = lock(&self.resources);
            if expected.is_some_and(|expected| !self.is_current(expected)) {
                return None;
            }
            let attempt = self.attempt.fetch_add(1, Ordering::AcqRel) + 1;
            (attempt, std::mem::take(&mut *guard))
        };
        let released = !resources.is_empty();
        if released {
            tracing::debug!("Releasing call resources");
        }
        resources.release();

        let mut vad = lock(&self.vad);
        vad.reset();
        self.publisher.update(|snapshot| {
            snapshot.audio_level = 0.0;
            snapshot.is_user_speaking = false;
            snapshot.is_ai_speaking = false;
            snapshot.is_muted = false;
        });
        Some((attempt, released))
    }

    fn on_local_level(&self, attempt: u64, level: f32, muted: bool) {
        let mut vad = lock(&self.vad);
        if !self.is_current(attempt) {
            return;
        }
        let transition = vad.observe(level, muted, Instant::now());
        self.publisher.update(|snapshot| {
            snapshot.audio_level = level;
            if let Some(transition) = transition {
                snapshot.is_user_speaking = transition == SpeakingTransition::Started;
            }
        });
        if let Some(transition) = transition {
            self.report_speaking(Participant::User, transition);
        }
    }

    fn on_remote_transition(&self, attempt: u64, transition: SpeakingTransition) {
        if !self.is_current(attempt) {
            return;
        }
        self.publisher.update(|snapshot| {
            snapshot.is_ai_speaking = transition == SpeakingTransition::Started;
        });
        self.report_speaking(Participant::Ai, transition);
    }

    fn report_speaking(&self, participant: Participant, transition: SpeakingTransition) {
        match transition {
            SpeakingTransition::Started => tracing::info!(%participant, "Speaking started"),
            SpeakingTransition::Stopped { duration_seconds } => {
                tracing::info!(%participant, duration_seconds, "Speaking stopped")
            }
        }
        let event = SpeakingEvent::new(participant, transition);
        self.publisher.emit(CallEvent::Speaking(event));
        let _ = self.speaking_tx.send(event);
    }

    fn on_server_message(&self, raw: &str) {
        let Some(event) = ServerEvent::parse(raw) else {
            tracing::debug!("Ignoring unparseable control message");
            return;
        };
        match event {
            ServerEvent::AudioTranscriptDone { transcript } => {
                self.publisher
                    .update(|snapshot| snapshot.transcript = transcript.clone());
                self.publisher.emit(CallEvent::TranscriptUpdated(transcript));
            }
            ServerEvent::ResponseDone {
                transcript: Some(response),
            } => {
                self.publisher
                    .update(|snapshot| snapshot.ai_response = response.clone());
                self.publisher.emit(CallEvent::AiResponseUpdated(response));
            }
            ServerEvent::Error { message } => self.on_channel_error(message),
            _ => {}
        }
    }

    /// Surfaced to observers; the call itself keeps running.
    fn on_channel_error(&self, message: String) {
        tracing::warn!(error = %message, "Control channel error");
        self.publisher
            .update(|snapshot| snapshot.error = Some(message.clone()));
        self.publisher.emit(CallEvent::ChannelError(message));
    }
}

async fn wait_for_open(events: &mut broadcast::Receiver<ChannelEvent>) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(ChannelEvent::Open) => return Ok(()),
            Ok(ChannelEvent::Closed) | Err(RecvError::Closed) => {
                return Err(CallError::Channel(
                    "Control channel closed before opening".into(),
                ))
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
        }
    }
}

async fn pump_channel(
    shared: Weak<Shared>,
    attempt: u64,
    mut events: broadcast::Receiver<ChannelEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Control channel listener lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if !shared.is_current(attempt) {
            break;
        }
        match event {
            ChannelEvent::Open => tracing::debug!("Control channel open"),
            ChannelEvent::Message(raw) => shared.on_server_message(&raw),
            ChannelEvent::Error(message) => shared.on_channel_error(message),
            ChannelEvent::Closed => {
                tracing::debug!("Control channel closed");
                break;
            }
        }
    }
}

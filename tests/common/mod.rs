//! In-memory host primitives and scripted backends for call scenarios.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ceritain_call::auth::StaticToken;
use ceritain_call::backend::{BalanceSource, Negotiator, SessionIssuer, UsageReporter};
use ceritain_call::call::{CallBackends, CallEvent, ConnectionDeps, RealtimeCallController};
use ceritain_call::config::CallConfig;
use ceritain_call::error::CallError;
use ceritain_call::media::{
    AudioSink, ChannelHub, DataChannel, LocalAudioStream, LocalAudioTrack, MediaDevices,
    PcmAnalyser, PeerConnection, PeerConnectionFactory, RemoteAudioTrack, RemoteTrackHandler,
    SessionDescription,
};
use ceritain_call::types::{
    Participant, SessionCredential, SessionRequest, SpeakingEvent, UsageReportOutcome,
};

// ---- microphone -------------------------------------------------------------

pub struct FakeTrack {
    id: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl FakeTrack {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl LocalAudioTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Grants or denies the microphone; every grant opens a fresh track and
/// analyser, like a real capture device.
pub struct FakeDevices {
    grant: AtomicBool,
    requests: AtomicUsize,
    tracks: Mutex<Vec<Arc<FakeTrack>>>,
    analysers: Mutex<Vec<Arc<PcmAnalyser>>>,
}

impl FakeDevices {
    pub fn new(grant: bool) -> Self {
        Self {
            grant: AtomicBool::new(grant),
            requests: AtomicUsize::new(0),
            tracks: Mutex::new(Vec::new()),
            analysers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_grant(&self, grant: bool) {
        self.grant.store(grant, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn tracks(&self) -> Vec<Arc<FakeTrack>> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks().iter().filter(|t| !t.is_stopped()).count()
    }

    pub fn latest_analyser(&self) -> Arc<PcmAnalyser> {
        self.analysers
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("microphone was never opened")
    }

    /// Feed a constant amplitude into the current microphone.
    pub fn set_amplitude(&self, amplitude: i16) {
        self.latest_analyser().push_pcm(&[amplitude; 256]);
    }

    pub fn speak(&self) {
        self.set_amplitude(i16::MAX);
    }

    pub fn silence(&self) {
        self.set_amplitude(0);
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn request_microphone(&self) -> Result<LocalAudioStream, CallError> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.grant.load(Ordering::SeqCst) {
            return Err(CallError::PermissionDenied(
                "NotAllowedError: Permission denied".into(),
            ));
        }
        let track = Arc::new(FakeTrack {
            id: format!("mic-{n}"),
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        });
        let analyser = Arc::new(PcmAnalyser::default());
        self.tracks.lock().unwrap().push(Arc::clone(&track));
        self.analysers.lock().unwrap().push(Arc::clone(&analyser));
        Ok(LocalAudioStream::new(vec![track], analyser))
    }
}

// ---- peer connection --------------------------------------------------------

/// Peer whose control channel opens as soon as the answer is applied.
pub struct FakePeer {
    on_remote_track: RemoteTrackHandler,
    channel: Mutex<Option<Arc<ChannelHub>>>,
    local_tracks: Mutex<Vec<String>>,
    receive_only: AtomicBool,
    remote: Mutex<Option<SessionDescription>>,
    closed: AtomicBool,
    open_on_answer: bool,
}

impl FakePeer {
    pub fn channel(&self) -> Arc<ChannelHub> {
        self.channel
            .lock()
            .unwrap()
            .clone()
            .expect("data channel was never created")
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn local_tracks(&self) -> Vec<String> {
        self.local_tracks.lock().unwrap().clone()
    }

    pub fn receives_audio(&self) -> bool {
        self.receive_only.load(Ordering::SeqCst)
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    fn add_track(&self, track: Arc<dyn LocalAudioTrack>) -> Result<(), CallError> {
        self.local_tracks.lock().unwrap().push(track.id().to_string());
        Ok(())
    }

    fn add_receive_only_audio(&self) -> Result<(), CallError> {
        self.receive_only.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>, CallError> {
        let hub = Arc::new(ChannelHub::new(label));
        *self.channel.lock().unwrap() = Some(Arc::clone(&hub));
        Ok(hub)
    }

    async fn create_offer(&self) -> Result<SessionDescription, CallError> {
        Ok(SessionDescription::offer("v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\n"))
    }

    async fn set_local_description(
        &self,
        _description: SessionDescription,
    ) -> Result<(), CallError> {
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), CallError> {
        *self.remote.lock().unwrap() = Some(description);
        if self.open_on_answer {
            (self.on_remote_track)(RemoteAudioTrack {
                id: "remote-audio".into(),
                stream_id: Some("remote".into()),
            });
            if let Some(channel) = self.channel.lock().unwrap().as_ref() {
                channel.open();
            }
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct FakePeerFactory {
    peers: Mutex<Vec<Arc<FakePeer>>>,
    open_on_answer: bool,
}

impl FakePeerFactory {
    pub fn new(open_on_answer: bool) -> Self {
        Self {
            peers: Mutex::new(Vec::new()),
            open_on_answer,
        }
    }

    pub fn peers(&self) -> Vec<Arc<FakePeer>> {
        self.peers.lock().unwrap().clone()
    }

    pub fn latest(&self) -> Arc<FakePeer> {
        self.peers().last().cloned().expect("no peer was created")
    }
}

impl PeerConnectionFactory for FakePeerFactory {
    fn create(
        &self,
        on_remote_track: RemoteTrackHandler,
    ) -> Result<Arc<dyn PeerConnection>, CallError> {
        let peer = Arc::new(FakePeer {
            on_remote_track,
            channel: Mutex::new(None),
            local_tracks: Mutex::new(Vec::new()),
            receive_only: AtomicBool::new(false),
            remote: Mutex::new(None),
            closed: AtomicBool::new(false),
            open_on_answer: self.open_on_answer,
        });
        self.peers.lock().unwrap().push(Arc::clone(&peer));
        Ok(peer)
    }
}

#[derive(Default)]
pub struct FakeSink {
    attached: Mutex<Vec<RemoteAudioTrack>>,
}

impl FakeSink {
    pub fn attached(&self) -> Vec<RemoteAudioTrack> {
        self.attached.lock().unwrap().clone()
    }
}

impl AudioSink for FakeSink {
    fn attach(&self, track: RemoteAudioTrack) -> Result<(), CallError> {
        self.attached.lock().unwrap().push(track);
        Ok(())
    }
}

// ---- backends ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    Answer(String),
    Fail(String),
    Hang,
}

pub struct FakeNegotiator {
    mode: Mutex<Negotiation>,
    offers: Mutex<Vec<String>>,
}

impl FakeNegotiator {
    pub fn new(mode: Negotiation) -> Self {
        Self {
            mode: Mutex::new(mode),
            offers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: Negotiation) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> usize {
        self.offers.lock().unwrap().len()
    }
}

#[async_trait]
impl Negotiator for FakeNegotiator {
    async fn exchange(
        &self,
        offer_sdp: &str,
        credential: SessionCredential,
    ) -> Result<String, CallError> {
        assert_eq!(credential.into_secret(), "ek_test");
        self.offers.lock().unwrap().push(offer_sdp.to_string());
        let mode = self.mode.lock().unwrap().clone();
        match mode {
            Negotiation::Answer(sdp) => Ok(sdp),
            Negotiation::Fail(message) => Err(CallError::Negotiation(message)),
            Negotiation::Hang => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct FakeIssuer {
    requests: Mutex<Vec<(SessionRequest, Option<String>)>>,
    failure: Mutex<Option<String>>,
    delay: Mutex<Duration>,
}

impl FakeIssuer {
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn requests(&self) -> Vec<(SessionRequest, Option<String>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionIssuer for FakeIssuer {
    async fn issue(
        &self,
        request: &SessionRequest,
        bearer_token: Option<&str>,
    ) -> Result<SessionCredential, CallError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.clone(), bearer_token.map(str::to_string)));
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(CallError::Negotiation(format!("API Error: {message}")));
        }
        Ok(SessionCredential::new("ek_test").with_session_id(Some("sess_1".into())))
    }
}

/// Replays queued outcomes, then answers `Ok`.
#[derive(Default)]
pub struct FakeUsage {
    outcomes: Mutex<VecDeque<UsageReportOutcome>>,
    reports: Mutex<Vec<(Participant, u64)>>,
    delay: Mutex<Duration>,
}

impl FakeUsage {
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn queue(&self, outcome: UsageReportOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn reports(&self) -> Vec<(Participant, u64)> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageReporter for FakeUsage {
    async fn report(
        &self,
        participant: Participant,
        _bearer_token: &str,
        seconds: u64,
    ) -> UsageReportOutcome {
        self.reports.lock().unwrap().push((participant, seconds));
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(UsageReportOutcome::Ok)
    }
}

pub struct FakeBalance {
    balance: Option<i64>,
    calls: AtomicUsize,
}

impl FakeBalance {
    /// `None` makes every fetch fail.
    pub fn new(balance: Option<i64>) -> Self {
        Self {
            balance,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BalanceSource for FakeBalance {
    async fn fetch_balance(&self, _bearer_token: &str) -> Result<i64, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.balance
            .ok_or_else(|| CallError::api(500, "balance service unavailable"))
    }
}

// ---- harness ----------------------------------------------------------------

pub const ANSWER_SDP: &str = "v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\n";

pub struct Setup {
    pub config: CallConfig,
    pub grant_microphone: bool,
    pub negotiation: Negotiation,
    pub open_on_answer: bool,
    pub balance: Option<i64>,
    pub token: Option<String>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            config: CallConfig::default(),
            grant_microphone: true,
            negotiation: Negotiation::Answer(ANSWER_SDP.to_string()),
            open_on_answer: true,
            balance: Some(100),
            token: Some("user-token".to_string()),
        }
    }
}

pub struct Harness {
    pub devices: Arc<FakeDevices>,
    pub peers: Arc<FakePeerFactory>,
    pub sink: Arc<FakeSink>,
    pub negotiator: Arc<FakeNegotiator>,
    pub issuer: Arc<FakeIssuer>,
    pub usage: Arc<FakeUsage>,
    pub balance: Arc<FakeBalance>,
    pub controller: RealtimeCallController,
}

impl Setup {
    pub fn build(self) -> Harness {
        let devices = Arc::new(FakeDevices::new(self.grant_microphone));
        let peers = Arc::new(FakePeerFactory::new(self.open_on_answer));
        let sink = Arc::new(FakeSink::default());
        let negotiator = Arc::new(FakeNegotiator::new(self.negotiation));
        let issuer = Arc::new(FakeIssuer::default());
        let usage = Arc::new(FakeUsage::default());
        let balance = Arc::new(FakeBalance::new(self.balance));

        let deps = ConnectionDeps {
            devices: devices.clone(),
            peers: peers.clone(),
            audio_sink: sink.clone(),
            negotiator: negotiator.clone(),
        };
        let backends = CallBackends {
            issuer: issuer.clone(),
            usage: usage.clone(),
            balance: balance.clone(),
        };
        let tokens = match self.token {
            Some(token) => StaticToken::new(token),
            None => StaticToken::anonymous(),
        };
        let controller =
            RealtimeCallController::new(&self.config, deps, backends, Arc::new(tokens));

        Harness {
            devices,
            peers,
            sink,
            negotiator,
            issuer,
            usage,
            balance,
            controller,
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Setup::default().build()
    }

    /// Push a raw server event into the active control channel.
    pub fn server_says(&self, raw: &str) {
        self.peers.latest().channel().deliver(raw);
    }
}

/// Let spawned tasks observe what the test just did.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn drain(events: &mut tokio::sync::broadcast::Receiver<CallEvent>) -> Vec<CallEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

pub fn speaking(events: &[CallEvent]) -> Vec<SpeakingEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            CallEvent::Speaking(speaking) => Some(*speaking),
            _ => None,
        })
        .collect()
}

//! Call state machine and usage metering.
//!
//! `idle -> connecting -> connected -> {disconnected, error}`; both terminal
//! states accept a fresh `connect`. Every confirmed speaking stop is reported
//! to the usage backend, and a depleted balance ends the call immediately.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use super::connection::{ConnectionDeps, SessionConnection};
use super::events::CallEvent;
use super::publisher::CallPublisher;
use super::status::{CallSnapshot, ConnectionStatus};
use crate::auth::TokenProvider;
use crate::backend::{BalanceSource, CeritainApi, SessionIssuer, UsageReporter};
use crate::config::CallConfig;
use crate::error::{CallError, Result};
use crate::types::{
    Participant, SessionRequest, SpeakingEvent, SpeakingTransition, UsageReportOutcome,
};

/// Backend collaborators used around a call.
#[derive(Clone)]
pub struct CallBackends {
    pub issuer: Arc<dyn SessionIssuer>,
    pub usage: Arc<dyn UsageReporter>,
    pub balance: Arc<dyn BalanceSource>,
}

impl CallBackends {
    /// All three collaborators served by one Ceritain API client.
    pub fn ceritain(api: CeritainApi) -> Self {
        let api = Arc::new(api);
        Self {
            issuer: api.clone(),
            usage: api.clone(),
            balance: api,
        }
    }
}

impl std::fmt::Debug for CallBackends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallBackends").finish_non_exhaustive()
    }
}

/// Entry point for UI collaborators.
///
/// Observers read [`CallSnapshot`] through [`subscribe_snapshot`] and typed
/// notifications through [`subscribe_events`].
///
/// [`subscribe_snapshot`]: RealtimeCallController::subscribe_snapshot
/// [`subscribe_events`]: RealtimeCallController::subscribe_events
#[derive(Clone)]
pub struct RealtimeCallController {
    inner: Arc<Inner>,
}

struct Inner {
    connection: SessionConnection,
    backends: CallBackends,
    tokens: Arc<dyn TokenProvider>,
    session: SessionRequest,
    publisher: CallPublisher,
    speaking_rx: Mutex<Option<mpsc::UnboundedReceiver<SpeakingEvent>>>,
    usage_task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeCallController {
    pub fn new(
        config: &CallConfig,
        deps: ConnectionDeps,
        backends: CallBackends,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let publisher = CallPublisher::new();
        let (speaking_tx, speaking_rx) = mpsc::unbounded_channel();
        let connection = SessionConnection::new(deps, config, publisher.clone(), speaking_tx);
        Self {
            inner: Arc::new(Inner {
                connection,
                backends,
                tokens,
                session: config.session.clone(),
                publisher,
                speaking_rx: Mutex::new(Some(speaking_rx)),
                usage_task: Mutex::new(None),
            }),
        }
    }

    /// Start a call with the configured prompt and voice.
    pub async fn connect(&self) -> Result<()> {
        self.connect_with(self.inner.session.clone()).await
    }

    /// Start a call, tearing down any session that is still running.
    ///
    /// With a bearer token the balance is checked first; a balance of zero
    /// or less surfaces depletion and never reaches the microphone.
    pub async fn connect_with(&self, request: SessionRequest) -> Result<()> {
        let inner = &self.inner;
        let status = inner.publisher.status();
        if !status.can_connect() {
            return Err(CallError::InvalidState(format!(
                "Cannot connect while {status}"
            )));
        }

        let token = inner.tokens.bearer_token();
        if let Some(token) = token.as_deref() {
            inner.check_balance(token).await?;
        }
        inner.publisher.update(|snapshot| snapshot.depleted = false);
        inner.ensure_usage_pump();

        let attempt = inner.connection.begin();
        let issuer = Arc::clone(&inner.backends.issuer);
        tracing::debug!(voice = %request.voice, "Requesting realtime session");
        inner
            .connection
            .run(attempt, async move {
                issuer.issue(&request, token.as_deref()).await
            })
            .await
    }

    /// Hang up. Idempotent and safe at any point.
    pub fn disconnect(&self) {
        self.inner.connection.disconnect();
    }

    pub fn toggle_mute(&self) -> Option<bool> {
        self.inner.connection.toggle_mute()
    }

    pub fn set_muted(&self, muted: bool) -> Option<bool> {
        self.inner.connection.set_muted(muted)
    }

    pub fn is_muted(&self) -> bool {
        self.inner.connection.is_muted()
    }

    pub fn snapshot(&self) -> CallSnapshot {
        self.inner.publisher.snapshot()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.publisher.status()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<CallSnapshot> {
        self.inner.publisher.subscribe_snapshot()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CallEvent> {
        self.inner.publisher.subscribe_events()
    }

    /// Fetch the balance and hand it to the token provider. `Ok(None)` when
    /// there is no bearer token.
    pub async fn refresh_balance(&self) -> Result<Option<i64>> {
        let Some(token) = self.inner.tokens.bearer_token() else {
            return Ok(None);
        };
        let balance = self.inner.backends.balance.fetch_balance(&token).await?;
        self.inner.tokens.record_balance(balance);
        Ok(Some(balance))
    }
}

impl std::fmt::Debug for RealtimeCallController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeCallController")
            .field("connection", &self.inner.connection)
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn check_balance(&self, token: &str) -> Result<()> {
        match self.backends.balance.fetch_balance(token).await {
            Ok(balance) => {
                self.tokens.record_balance(balance);
                if balance <= 0 {
                    tracing::warn!(balance, "Token balance exhausted, not connecting");
                    self.deplete();
                    return Err(CallError::UsageDepleted);
                }
                tracing::debug!(balance, "Balance check passed");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(%error, "Balance check failed, connecting anyway");
                Ok(())
            }
        }
    }

    /// Surface depletion and end any running or pending session.
    fn deplete(&self) {
        let mut newly_depleted = false;
        self.publisher.update(|snapshot| {
            newly_depleted = !snapshot.depleted;
            snapshot.depleted = true;
            snapshot.error = None;
            snapshot.recovery = None;
        });
        let live = matches!(
            self.publisher.status(),
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        );
        // A pending attempt is invalidated too, so it unwinds as cancelled.
        if live || self.connection.has_session() {
            self.connection.disconnect();
        }
        if newly_depleted {
            self.publisher.emit(CallEvent::BalanceDepleted);
        }
    }

    fn ensure_usage_pump(self: &Arc<Self>) {
        let Some(speaking) = self
            .speaking_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        let task = tokio::spawn(run_usage_pump(Arc::downgrade(self), speaking));
        *self.usage_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    async fn report_usage(&self, participant: Participant, seconds: u64) {
        if seconds == 0 {
            tracing::debug!(%participant, "Skipping zero-length usage report");
            return;
        }
        let Some(token) = self.tokens.bearer_token() else {
            tracing::debug!(%participant, seconds, "No bearer token, usage not reported");
            return;
        };

        let outcome = self.backends.usage.report(participant, &token, seconds).await;
        match &outcome {
            UsageReportOutcome::Ok => {
                tracing::debug!(%participant, seconds, "Usage recorded");
            }
            UsageReportOutcome::Depleted => {
                tracing::warn!(%participant, seconds, "Token balance depleted, ending call");
                self.deplete();
            }
            UsageReportOutcome::TransportError { message } => {
                tracing::warn!(%participant, seconds, error = %message, "Usage report failed");
            }
        }
        self.publisher.emit(CallEvent::UsageReported {
            participant,
            seconds,
            outcome,
        });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self
            .usage_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.connection.disconnect();
    }
}

/// Reports are sent one at a time, in the order the stops were confirmed.
async fn run_usage_pump(inner: Weak<Inner>, mut speaking: mpsc::UnboundedReceiver<SpeakingEvent>) {
    while let Some(event) = speaking.recv().await {
        let SpeakingTransition::Stopped { duration_seconds } = event.transition else {
            continue;
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.report_usage(event.participant, duration_seconds).await;
    }
}

//! Snapshot and event fan-out shared by the connection and the controller.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use super::events::CallEvent;
use super::status::{CallSnapshot, ConnectionStatus};
use crate::error::CallError;

const EVENT_CAPACITY: usize = 128;

/// Publishes render state over `watch` and discrete events over `broadcast`.
#[derive(Debug, Clone)]
pub struct CallPublisher {
    snapshot: Arc<watch::Sender<CallSnapshot>>,
    events: broadcast::Sender<CallEvent>,
}

impl Default for CallPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl CallPublisher {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(CallSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            snapshot: Arc::new(snapshot),
            events,
        }
    }

    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.snapshot.borrow().status
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Move to `status`, announcing it only if it changed.
    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        let changed = self.snapshot.send_if_modified(|snapshot| {
            if snapshot.status == status {
                return false;
            }
            snapshot.status = status;
            true
        });
        if changed {
            tracing::debug!(%status, "Call status changed");
            self.emit(CallEvent::StatusChanged(status));
        }
    }

    /// Enter the error state, keeping the message and how to recover.
    pub(crate) fn fail(&self, error: &CallError) {
        self.snapshot.send_modify(|snapshot| {
            snapshot.error = Some(error.to_string());
            snapshot.recovery = Some(error.recovery_suggestion());
        });
        self.set_status(ConnectionStatus::Error);
    }

    pub(crate) fn update(&self, modify: impl FnOnce(&mut CallSnapshot)) {
        self.snapshot.send_modify(modify);
    }

    pub(crate) fn emit(&self, event: CallEvent) {
        let _ = self.events.send(event);
    }
}

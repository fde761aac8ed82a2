//! Bidirectional control channel carrying realtime JSON events.

use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::broadcast;

use crate::error::CallError;

/// Lifecycle and payload notifications from a control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Error(String),
    Closed,
}

/// A negotiated control channel.
///
/// Every `subscribe` call creates an independent listener; dropping one
/// receiver never affects the others.
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;

    fn send(&self, text: &str) -> Result<(), CallError>;

    /// Close the channel. Idempotent.
    fn close(&self);
}

const STATE_CONNECTING: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Broadcast-backed [`DataChannel`] that host transports drive.
///
/// The transport calls [`ChannelHub::open`], [`ChannelHub::deliver`] and
/// [`ChannelHub::fail`] as the underlying channel reports them; outbound
/// messages are forwarded to the transport through `outbound`.
#[derive(Debug)]
pub struct ChannelHub {
    label: String,
    events: broadcast::Sender<ChannelEvent>,
    outbound: Option<tokio::sync::mpsc::UnboundedSender<String>>,
    state: AtomicU8,
}

impl ChannelHub {
    const CAPACITY: usize = 256;

    pub fn new(label: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(Self::CAPACITY);
        Self {
            label: label.into(),
            events,
            outbound: None,
            state: AtomicU8::new(STATE_CONNECTING),
        }
    }

    /// Forward `send` calls to the transport.
    pub fn with_outbound(mut self, outbound: tokio::sync::mpsc::UnboundedSender<String>) -> Self {
        self.outbound = Some(outbound);
        self
    }

    pub fn open(&self) {
        if self
            .state
            .compare_exchange(STATE_CONNECTING, STATE_OPEN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let _ = self.events.send(ChannelEvent::Open);
        }
    }

    pub fn deliver(&self, text: impl Into<String>) {
        if !self.is_closed() {
            let _ = self.events.send(ChannelEvent::Message(text.into()));
        }
    }

    pub fn fail(&self, message: impl Into<String>) {
        if !self.is_closed() {
            let _ = self.events.send(ChannelEvent::Error(message.into()));
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_OPEN
    }

    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_CLOSED
    }

    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl DataChannel for ChannelHub {
    fn label(&self) -> &str {
        &self.label
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    fn send(&self, text: &str) -> Result<(), CallError> {
        if !self.is_open() {
            return Err(CallError::Channel(format!(
                "Channel '{}' is not open",
                self.label
            )));
        }
        match &self.outbound {
            Some(outbound) => outbound
                .send(text.to_string())
                .map_err(|_| CallError::Channel("Channel transport has gone away".into())),
            None => Ok(()),
        }
    }

    fn close(&self) {
        if self.state.swap(STATE_CLOSED, Ordering::AcqRel) != STATE_CLOSED {
            let _ = self.events.send(ChannelEvent::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listeners_are_independent() {
        let hub = ChannelHub::new("oai-events");
        let mut first = hub.subscribe();
        let second = hub.subscribe();
        drop(second);

        hub.open();
        hub.deliver("{\"type\":\"response.done\"}");

        assert_eq!(first.recv().await.unwrap(), ChannelEvent::Open);
        assert_eq!(
            first.recv().await.unwrap(),
            ChannelEvent::Message("{\"type\":\"response.done\"}".into())
        );
        assert_eq!(hub.listener_count(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_silences_the_channel() {
        let hub = ChannelHub::new("oai-events");
        let mut rx = hub.subscribe();
        hub.close();
        hub.close();
        hub.deliver("late");
        hub.open();

        assert_eq!(rx.recv().await.unwrap(), ChannelEvent::Closed);
        assert!(rx.try_recv().is_err());
        assert!(hub.send("x").is_err());
    }

    #[tokio::test]
    async fn send_forwards_to_transport_once_open() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let hub = ChannelHub::new("oai-events").with_outbound(tx);
        assert!(hub.send("early").is_err());
        hub.open();
        hub.send("{\"type\":\"response.create\"}").unwrap();
        assert_eq!(rx.recv().await.unwrap(), "{\"type\":\"response.create\"}");
    }
}

//! Duplex channel to the conversation service
//!
//! The session only sees a `ChannelHandle`: an ordered outbound queue of
//! protocol messages and an inbound stream of channel events. The
//! WebSocket implementation pumps both directions on one task.

mod websocket;

use tokio::sync::mpsc;
use url::Url;

use crate::error::SessionError;
use crate::protocol::OutboundMessage;

pub use websocket::WebSocketConnector;

/// What the channel reports to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A text frame
    Message(String),
    /// Transport failure. A `Closed` event always follows.
    Error(String),
    /// The channel is gone (either side closed it)
    Closed,
}

/// Exclusive handle to one open channel. Dropping it closes the channel.
#[derive(Debug)]
pub struct ChannelHandle {
    outbound: mpsc::Sender<OutboundMessage>,
    inbound: mpsc::Receiver<ChannelEvent>,
}

impl ChannelHandle {
    pub fn new(
        outbound: mpsc::Sender<OutboundMessage>,
        inbound: mpsc::Receiver<ChannelEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Queue a message; messages go out in the order they are sent
    pub async fn send(&self, message: OutboundMessage) -> Result<(), SessionError> {
        let kind = message.kind();
        self.outbound
            .send(message)
            .await
            .map_err(|_| SessionError::Transport(format!("channel closed while sending {}", kind)))
    }

    pub fn is_writable(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Next inbound event; `None` once the channel task has gone away
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.inbound.recv().await
    }

    /// Close the channel. Queued messages are flushed first.
    pub fn close(self) {
        drop(self);
    }
}

/// Opens channels
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<ChannelHandle, SessionError>;
}

//! Transport types
//!
//! Common types shared across transport implementations.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use typelens_core::{decode_server_event, ProtocolError, ServerEvent};

/// Channel errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    /// No link is open
    #[error("Channel is not open")]
    NotOpen,

    /// Connection refused, bad URL, handshake failure
    #[error("Connect error: {0}")]
    Connect(String),

    /// Connect attempt exceeded the configured timeout
    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    /// Outbound message could not be encoded
    #[error("Serialize error: {0}")]
    Serialize(String),

    /// The pump task is gone
    #[error("Channel closed")]
    Closed,
}

/// Observable state of the persistent connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// One item pulled from the inbound queue
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Server(ServerEvent),
    /// Frame that could not be decoded
    Protocol(ProtocolError),
    /// The link went away; carries the reason
    Disconnected(String),
}

impl ChannelEvent {
    /// Classify one inbound text frame
    pub fn from_frame(text: &str) -> Self {
        match decode_server_event(text) {
            Ok(event) => ChannelEvent::Server(event),
            Err(err) => ChannelEvent::Protocol(err),
        }
    }
}

/// Outbound frame handed to the pump
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

/// One open connection: two queues and the task moving frames between
/// them and the peer
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Frame>,
    pub inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    pub pump: JoinHandle<()>,
}

/// Connection factory
///
/// Abstraction over the socket layer to enable testing with FakeTransport.
pub trait ChannelTransport: Send + Sync {
    /// Open a connection to `url` and start its pump
    fn connect(&self, url: &str) -> impl Future<Output = Result<Link, ChannelError>> + Send;
}

//! Channel transport
//!
//! Concrete transport enum wrapping all transport types, avoiding dyn
//! compatibility issues with the async connect method.

use std::future::Future;

pub use super::transport_fake::{FakeServer, FakeTransport};
pub use super::transport_types::{ChannelError, ChannelTransport, Link};
pub use super::transport_ws::WsTransport;

#[derive(Debug, Clone)]
pub enum Transport {
    WebSocket(WsTransport),
    Fake(FakeTransport),
}

impl ChannelTransport for Transport {
    fn connect(&self, url: &str) -> impl Future<Output = Result<Link, ChannelError>> + Send {
        let transport = self.clone();
        let url = url.to_string();
        async move {
            match transport {
                Transport::WebSocket(t) => t.connect(&url).await,
                Transport::Fake(t) => t.connect(&url).await,
            }
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Transport::WebSocket(WsTransport::new())
    }
}

impl Transport {
    /// Fake transport plus its control handle
    pub fn fake() -> (Self, FakeServer) {
        let (transport, server) = FakeTransport::new();
        (Transport::Fake(transport), server)
    }
}

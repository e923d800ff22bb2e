//! Persistent channel to the analysis backend
//!
//! One pump task per connection moves frames between the socket and two
//! ordered queues; the session is the single consumer of the inbound one.

pub mod manager;
pub mod transport;
pub mod transport_fake;
pub mod transport_types;
pub mod transport_ws;

pub use manager::{ChannelManager, ReconnectPolicy};
pub use transport::Transport;
pub use transport_fake::{FakeServer, FakeTransport};
pub use transport_types::{ChannelError, ChannelEvent, ChannelTransport, ConnectionStatus};
pub use transport_ws::WsTransport;

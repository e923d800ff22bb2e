//! TypeLens: streaming column-analysis client
//!
//! Keeps one persistent channel to an analysis backend, issues analysis
//! requests and folds the streamed events into a single result document.
//! The pure pieces (settings, protocol, state machine, aggregator) live in
//! `typelens-core`; this crate adds the I/O around them.

pub mod channel;
pub mod cli;
pub mod config;
pub mod logging;
pub mod session;

pub use channel::{ChannelManager, ConnectionStatus, FakeServer, ReconnectPolicy, Transport};
pub use config::{ClientConfig, ConfigError};
pub use session::{AnalysisSession, RunFailure, SessionSnapshot, SessionUpdate, StartError};

pub use typelens_core;

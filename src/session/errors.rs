//! Session errors
//!
//! Error types for the analysis session facade.

use std::fmt;
use std::time::Duration;

use typelens_core::{ErrorPayload, SessionState, SettingsError, TransitionError};

use crate::channel::ChannelError;

/// Why `start_analysis` refused or could not deliver a request
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StartError {
    #[error("Analysis already in progress ({0})")]
    AlreadyInProgress(SessionState),

    #[error("Configuration error: {0}")]
    Configuration(#[from] SettingsError),

    #[error("State error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Transport error: {0}")]
    Transport(#[from] ChannelError),
}

/// How a run ended in `Errored`
#[derive(Debug, Clone, PartialEq)]
pub enum RunFailure {
    /// `error` event from the backend
    Backend(ErrorPayload),
    /// Link lost mid-run
    Disconnected(String),
    /// No inbound event within the silence timeout
    TimedOut(Duration),
    /// The request never left the client
    SendFailed(String),
}

impl RunFailure {
    /// Local failures are folded into the result as an error payload
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            RunFailure::Backend(payload) => payload.clone(),
            RunFailure::Disconnected(reason) => {
                ErrorPayload::new("disconnected", format!("connection lost: {reason}"))
            }
            RunFailure::TimedOut(after) => ErrorPayload::new(
                "timeout",
                format!("no event from the backend for {}s", after.as_secs()),
            ),
            RunFailure::SendFailed(reason) => {
                ErrorPayload::new("send_failed", format!("request not sent: {reason}"))
            }
        }
    }

    /// Failure of the connection rather than of the analysis
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RunFailure::Disconnected(_) | RunFailure::SendFailed(_)
        )
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFailure::Backend(payload) => match &payload.code {
                Some(code) => write!(f, "backend error [{code}]: {}", payload.message),
                None => write!(f, "backend error: {}", payload.message),
            },
            other => f.write_str(&other.to_payload().message),
        }
    }
}

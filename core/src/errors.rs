//! Error types for the pure session core
//!
//! One enum per concern: configuration, wire protocol, state transitions.

use crate::settings::{CredentialField, DatabaseKind};
use crate::state::SessionState;

/// Configuration errors, detected locally before any network activity
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Database type not selected")]
    DatabaseKindUnset,

    #[error("Unknown credential field: {0}")]
    UnknownField(String),

    #[error("Field '{field}' does not apply to {kind}")]
    FieldNotApplicable {
        field: CredentialField,
        kind: DatabaseKind,
    },

    #[error("Missing required field '{field}' for {kind}")]
    MissingField {
        field: CredentialField,
        kind: DatabaseKind,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField {
        field: CredentialField,
        reason: String,
    },

    #[error("Unknown database type: {0}")]
    UnknownDatabaseKind(String),
}

/// Inbound frames that could not be turned into a server event
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    /// Not JSON, or a known event with the wrong shape
    #[error("Malformed event: {0}")]
    Malformed(String),

    /// Well-formed JSON with an event type this client does not know
    #[error("Unknown event type: {0}")]
    UnknownKind(String),
}

/// Rejected state machine transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Analysis already in progress ({0})")]
    AlreadyInProgress(SessionState),

    #[error("Illegal transition from {from} to {to}")]
    Illegal { from: SessionState, to: SessionState },
}

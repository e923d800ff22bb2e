//! Session updates
//!
//! What one processed channel event did to the session, and the snapshot
//! published to observers after every change.

use typelens_core::{AnalysisResult, AnalysisSettings, SessionState};

use super::errors::RunFailure;
use crate::channel::ConnectionStatus;

/// Outcome of processing one channel event
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Progress indicator from the backend
    Progress(f64),
    /// A fragment was merged
    Columns {
        added: usize,
        replaced: usize,
        total: usize,
    },
    /// Authoritative result received, run completed
    Completed,
    /// Run ended in `Errored`
    Failed(RunFailure),
    /// Stale or undecodable event, dropped
    Ignored,
    /// Link lost while no run was in flight
    Disconnected,
}

impl SessionUpdate {
    /// The run reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionUpdate::Completed | SessionUpdate::Failed(_))
    }
}

/// Read-only view of the session
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub settings: AnalysisSettings,
    pub state: SessionState,
    pub progress: Option<f64>,
    pub result: Option<AnalysisResult>,
    pub failure: Option<RunFailure>,
    pub connection: ConnectionStatus,
}

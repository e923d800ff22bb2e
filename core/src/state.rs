//! Session state machine
//!
//! Tracks the progress of a single analysis run:
//!
//! ```text
//! Idle ──begin──> Requesting ──first progress/partial──> Streaming
//!                     │                                     │
//!                     ├──────────── done ──> Completed <────┤
//!                     └──── error / transport ──> Errored <─┘
//! Completed | Errored ──begin──> Requesting
//! ```
//!
//! Only one run is in flight at a time. `begin` while a run is in flight is
//! rejected, never queued.

use std::fmt;

use serde::Serialize;

use crate::errors::TransitionError;

/// State of the current (or last) run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Requesting,
    Streaming,
    Completed,
    Errored,
}

impl SessionState {
    /// A run has been started and has not reached a terminal state
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SessionState::Requesting | SessionState::Streaming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Errored)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Requesting => "requesting",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Errored => "errored",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Owner of the live `SessionState`
#[derive(Debug, Default)]
pub struct SessionStateMachine {
    state: SessionState,
    /// Transitions of the current run, starting with the `begin` transition
    history: Vec<Transition>,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Start a new run
    pub fn begin(&mut self) -> Result<(), TransitionError> {
        if self.state.is_in_flight() {
            return Err(TransitionError::AlreadyInProgress(self.state));
        }
        self.history.clear();
        self.move_to(SessionState::Requesting);
        Ok(())
    }

    /// First sign of life from the backend. No-op when already streaming.
    pub fn mark_streaming(&mut self) -> Result<(), TransitionError> {
        match self.state {
            SessionState::Requesting => {
                self.move_to(SessionState::Streaming);
                Ok(())
            }
            SessionState::Streaming => Ok(()),
            from => Err(TransitionError::Illegal {
                from,
                to: SessionState::Streaming,
            }),
        }
    }

    /// Terminal success
    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.finish(SessionState::Completed)
    }

    /// Terminal failure (backend error, transport failure, timeout)
    pub fn fail(&mut self) -> Result<(), TransitionError> {
        self.finish(SessionState::Errored)
    }

    fn finish(&mut self, to: SessionState) -> Result<(), TransitionError> {
        if !self.state.is_in_flight() {
            return Err(TransitionError::Illegal {
                from: self.state,
                to,
            });
        }
        self.move_to(to);
        Ok(())
    }

    fn move_to(&mut self, to: SessionState) {
        let from = self.state;
        self.state = to;
        self.history.push(Transition { from, to });
        tracing::debug!(%from, %to, "session state changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut machine = SessionStateMachine::new();
        assert_eq!(machine.state(), SessionState::Idle);

        machine.begin().unwrap();
        assert_eq!(machine.state(), SessionState::Requesting);
        machine.mark_streaming().unwrap();
        machine.mark_streaming().unwrap();
        assert_eq!(machine.state(), SessionState::Streaming);
        machine.complete().unwrap();
        assert_eq!(machine.state(), SessionState::Completed);

        let path: Vec<_> = machine.history().iter().map(|t| t.to).collect();
        assert_eq!(
            path,
            vec![
                SessionState::Requesting,
                SessionState::Streaming,
                SessionState::Completed
            ]
        );
        assert_eq!(machine.history()[0].from, SessionState::Idle);
    }

    #[test]
    fn test_begin_rejected_while_in_flight() {
        let mut machine = SessionStateMachine::new();
        machine.begin().unwrap();
        assert_eq!(
            machine.begin(),
            Err(TransitionError::AlreadyInProgress(SessionState::Requesting))
        );

        machine.mark_streaming().unwrap();
        assert_eq!(
            machine.begin(),
            Err(TransitionError::AlreadyInProgress(SessionState::Streaming))
        );
        assert_eq!(machine.state(), SessionState::Streaming);
    }

    #[test]
    fn test_done_straight_from_requesting() {
        let mut machine = SessionStateMachine::new();
        machine.begin().unwrap();
        machine.complete().unwrap();
        assert_eq!(machine.state(), SessionState::Completed);
    }

    #[test]
    fn test_new_run_from_terminal_states() {
        let mut machine = SessionStateMachine::new();
        machine.begin().unwrap();
        machine.fail().unwrap();
        assert_eq!(machine.state(), SessionState::Errored);

        machine.begin().unwrap();
        assert_eq!(machine.state(), SessionState::Requesting);
        assert_eq!(machine.history().len(), 1);
        assert_eq!(machine.history()[0].from, SessionState::Errored);

        machine.complete().unwrap();
        machine.begin().unwrap();
        assert_eq!(machine.state(), SessionState::Requesting);
    }

    #[test]
    fn test_illegal_transitions_leave_state() {
        let mut machine = SessionStateMachine::new();
        assert!(machine.complete().is_err());
        assert!(machine.fail().is_err());
        assert!(machine.mark_streaming().is_err());
        assert_eq!(machine.state(), SessionState::Idle);

        machine.begin().unwrap();
        machine.complete().unwrap();
        assert_eq!(
            machine.fail(),
            Err(TransitionError::Illegal {
                from: SessionState::Completed,
                to: SessionState::Errored
            })
        );
        assert_eq!(machine.state(), SessionState::Completed);
    }

    #[test]
    fn test_state_predicates() {
        assert!(SessionState::Requesting.is_in_flight());
        assert!(SessionState::Streaming.is_in_flight());
        assert!(!SessionState::Idle.is_in_flight());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Errored.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
    }
}

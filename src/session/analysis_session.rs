//! Analysis session facade
//!
//! Owns the channel, the settings store, the state machine and the
//! aggregator. All mutation goes through `&mut self` from a single task;
//! observers get snapshots through a watch channel.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use typelens_core::{
    Applied, AnalysisResult, AnalysisSettings, ClientMessage, DatabaseKind, LimitChange,
    ProtocolError, ResultAggregator, RunSeed, ServerEvent, SessionState, SessionStateMachine,
    SettingsError,
};
use uuid::Uuid;

use super::errors::{RunFailure, StartError};
use super::events::{SessionSnapshot, SessionUpdate};
use crate::channel::{ChannelEvent, ChannelManager, ConnectionStatus, Transport};
use crate::config::{ClientConfig, ConfigError};

/// How many locally failed runs are remembered for dropping their late results
const ABANDONED_RUNS_KEPT: usize = 8;

/// The coordinator the rest of the application talks to
#[derive(Debug)]
pub struct AnalysisSession {
    channel: ChannelManager,
    settings: AnalysisSettings,
    machine: SessionStateMachine,
    aggregator: ResultAggregator,
    failure: Option<RunFailure>,
    request_id: Option<Uuid>,
    silence_timeout: Duration,
    /// Runs failed locally while the backend may still be working on them
    abandoned: VecDeque<Uuid>,
    observers: watch::Sender<SessionSnapshot>,
}

impl AnalysisSession {
    /// Create the session-owned channel and open it
    ///
    /// An unreachable backend is not an error here: the session starts with
    /// `ConnectionStatus::Disconnected` and reconnects on the next start.
    pub async fn connect(config: &ClientConfig, transport: Transport) -> Result<Self, ConfigError> {
        let settings = config.analysis.settings()?;
        let channel = ChannelManager::new(
            config.server.url.clone(),
            transport,
            config.server.connect_timeout(),
            config.server.reconnect.policy(),
        );
        let (observers, _) = watch::channel(SessionSnapshot::default());

        let mut session = Self {
            channel,
            settings,
            machine: SessionStateMachine::new(),
            aggregator: ResultAggregator::new(),
            failure: None,
            request_id: None,
            silence_timeout: config.server.silence_timeout(),
            abandoned: VecDeque::new(),
            observers,
        };

        let status = session.channel.open().await;
        info!(url = %config.server.url, ?status, "session ready");
        session.publish();
        Ok(session)
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.aggregator.result()
    }

    pub fn progress(&self) -> Option<f64> {
        self.aggregator.progress()
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    /// Id of the current or last run
    pub fn request_id(&self) -> Option<Uuid> {
        self.request_id
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.channel.status()
    }

    pub fn state_history(&self) -> &[typelens_core::Transition] {
        self.machine.history()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            settings: self.settings.clone(),
            state: self.machine.state(),
            progress: self.aggregator.progress(),
            result: self.aggregator.result().cloned(),
            failure: self.failure.clone(),
            connection: self.channel.status(),
        }
    }

    /// Receive a fresh snapshot after every change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.observers.subscribe()
    }

    pub fn set_sample_row_limit(&mut self, change: LimitChange) -> u32 {
        let limit = self.settings.set_sample_row_limit(change);
        self.publish();
        limit
    }

    pub fn set_database_kind(&mut self, kind: DatabaseKind) {
        self.settings.set_database_kind(kind);
        self.publish();
    }

    pub fn set_credential_field(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), SettingsError> {
        self.settings.set_credential_field(name, value)?;
        self.publish();
        Ok(())
    }

    /// Start one analysis run with the current settings
    ///
    /// Rejections (run in flight, invalid settings) leave every piece of
    /// session state untouched and send nothing.
    pub async fn start_analysis(&mut self) -> Result<Uuid, StartError> {
        let state = self.machine.state();
        if state.is_in_flight() {
            warn!(%state, "start rejected, analysis already in progress");
            return Err(StartError::AlreadyInProgress(state));
        }

        let request = self.settings.validate().map_err(|e| {
            warn!(error = %e, "start rejected, invalid settings");
            e
        })?;

        self.channel.refresh();
        if !self.channel.is_open() {
            info!("channel down, reconnecting before start");
            self.channel.reopen().await;
        }

        self.machine.begin()?;
        let request_id = Uuid::new_v4();
        self.request_id = Some(request_id);
        self.failure = None;
        self.aggregator.begin_run(&RunSeed {
            request_id,
            schema: request.schema.clone(),
            table: request.table.clone(),
            sample_size: request.sample_row_limit,
        });

        let message = ClientMessage::start_analysis(request_id, &request);
        if let Err(err) = self.channel.send(&message) {
            warn!(%request_id, error = %err, "start request not delivered");
            self.fail_run(RunFailure::SendFailed(err.to_string()));
            return Err(StartError::Transport(err));
        }

        info!(
            %request_id,
            kind = %request.kind,
            table = %request.table,
            limit = request.sample_row_limit,
            "analysis requested"
        );
        self.publish();
        Ok(request_id)
    }

    /// Wait for the next channel event and process it
    ///
    /// While a run is in flight the wait is bounded by the silence timeout.
    /// Returns `None` when there is no link and nothing in flight.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let in_flight = self.machine.state().is_in_flight();

        let event = if in_flight {
            match tokio::time::timeout(self.silence_timeout, self.channel.recv()).await {
                Ok(event) => event,
                Err(_) => {
                    warn!(timeout = ?self.silence_timeout, "no event from backend, failing run");
                    return Some(self.fail_run(RunFailure::TimedOut(self.silence_timeout)));
                }
            }
        } else {
            self.channel.recv().await
        };

        match event {
            Some(event) => Some(self.handle_channel_event(event)),
            None if in_flight => {
                let failure = RunFailure::Disconnected("channel not open".to_string());
                Some(self.fail_run(failure))
            }
            None => None,
        }
    }

    /// Drive the current run to `Completed` or `Errored`
    pub async fn run_until_terminal(&mut self) -> SessionState {
        while self.machine.state().is_in_flight() {
            if self.next_update().await.is_none() {
                break;
            }
        }
        self.machine.state()
    }

    /// Route one channel event to the aggregator and state machine
    pub fn handle_channel_event(&mut self, event: ChannelEvent) -> SessionUpdate {
        let update = match event {
            ChannelEvent::Server(event) => self.handle_server_event(event),
            ChannelEvent::Protocol(err) => {
                match &err {
                    ProtocolError::UnknownKind(kind) => {
                        warn!(%kind, "unknown event type dropped")
                    }
                    ProtocolError::Malformed(reason) => {
                        warn!(%reason, "malformed event dropped")
                    }
                }
                SessionUpdate::Ignored
            }
            ChannelEvent::Disconnected(reason) => {
                if self.machine.state().is_in_flight() {
                    self.fail_run(RunFailure::Disconnected(reason))
                } else {
                    info!(%reason, "channel lost while idle");
                    SessionUpdate::Disconnected
                }
            }
        };
        self.publish();
        update
    }

    /// Close the channel. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.channel.close().await;
        self.publish();
    }

    fn handle_server_event(&mut self, event: ServerEvent) -> SessionUpdate {
        let state = self.machine.state();
        if !state.is_in_flight() {
            debug!(kind = event.kind(), %state, "stale event ignored");
            return SessionUpdate::Ignored;
        }

        if let ServerEvent::Done { payload } = &event {
            if self.is_abandoned(&payload.metadata.request_id) {
                debug!(
                    request_id = %payload.metadata.request_id,
                    "result of abandoned run dropped"
                );
                return SessionUpdate::Ignored;
            }
        }

        debug!(kind = event.kind(), "server event");
        if !event.is_terminal() {
            if let Err(e) = self.machine.mark_streaming() {
                warn!(error = %e, "unexpected state for streaming event");
            }
        }

        match self.aggregator.apply(&event) {
            Applied::Progress(value) => SessionUpdate::Progress(value),
            Applied::Merged { added, replaced } => {
                let total = self.aggregator.result().map_or(0, |r| r.columns().len());
                debug!(added, replaced, total, "fragment merged");
                SessionUpdate::Columns {
                    added,
                    replaced,
                    total,
                }
            }
            Applied::Replaced => {
                if let Err(e) = self.machine.complete() {
                    warn!(error = %e, "could not complete run");
                }
                let columns = self.aggregator.result().map_or(0, |r| r.columns().len());
                info!(request_id = ?self.request_id, columns, "analysis completed");
                SessionUpdate::Completed
            }
            Applied::Failed(payload) => {
                if let Err(e) = self.machine.fail() {
                    warn!(error = %e, "could not fail run");
                }
                warn!(message = %payload.message, code = ?payload.code, "backend reported error");
                let failure = RunFailure::Backend(payload);
                self.failure = Some(failure.clone());
                SessionUpdate::Failed(failure)
            }
        }
    }

    /// Locally detected failure of the in-flight run
    fn fail_run(&mut self, failure: RunFailure) -> SessionUpdate {
        self.aggregator.fail(failure.to_payload());
        if let Err(e) = self.machine.fail() {
            warn!(error = %e, "could not fail run");
        }
        warn!(%failure, "analysis failed");
        if let Some(request_id) = self.request_id {
            if self.abandoned.len() == ABANDONED_RUNS_KEPT {
                self.abandoned.pop_front();
            }
            self.abandoned.push_back(request_id);
        }
        self.failure = Some(failure.clone());
        self.publish();
        SessionUpdate::Failed(failure)
    }

    fn is_abandoned(&self, request_id: &str) -> bool {
        Uuid::parse_str(request_id).is_ok_and(|id| self.abandoned.contains(&id))
    }

    fn publish(&self) {
        self.observers.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::FakeServer;

    const COLUMN_ID: &str = r#"{"column_name":"id","predicted_type":"INTEGER","expected_type":"INTEGER","confidence":0.97,"concordance":true,"samples":100,"issues":[],"confidence_details":{"heuristic_rules":{"confidence":0.99,"method":"rules","description":"d"},"machine_learning":{"confidence":0.95,"method":"rf","description":"d"},"generative_ai":{"confidence":0.97,"method":"llm","description":"d"}}}"#;

    fn config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.server.url = "ws://fake".to_string();
        config.server.reconnect.max_attempts = 1;
        config.server.reconnect.initial_backoff_ms = 1;
        config.server.silence_timeout_secs = 5;
        config
    }

    async fn postgres_session() -> (AnalysisSession, FakeServer) {
        let (transport, server) = Transport::fake();
        let mut session = AnalysisSession::connect(&config(), transport).await.unwrap();
        session.set_database_kind(DatabaseKind::Postgres);
        session
            .set_credential_field("url", "postgresql://u:p@h:5432/shop")
            .unwrap();
        session.set_credential_field("tableId", "orders").unwrap();
        (session, server)
    }

    fn partial(column: &str) -> String {
        format!(r#"{{"type":"partial_result","payload":[{column}]}}"#)
    }

    #[tokio::test]
    async fn test_connect_opens_channel() {
        let (session, server) = postgres_session().await;
        assert_eq!(session.connection_status(), ConnectionStatus::Connected);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(server.connections(), 1);
    }

    #[tokio::test]
    async fn test_unset_kind_rejected_without_side_effects() {
        let (transport, server) = Transport::fake();
        let mut session = AnalysisSession::connect(&config(), transport).await.unwrap();

        let err = session.start_analysis().await.unwrap_err();
        assert_eq!(
            err,
            StartError::Configuration(SettingsError::DatabaseKindUnset)
        );
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.result().is_none());
        assert!(session.request_id().is_none());
        tokio::task::yield_now().await;
        assert!(server.sent().is_empty());
    }

    #[tokio::test]
    async fn test_stale_event_ignored_when_idle() {
        let (mut session, _server) = postgres_session().await;
        let update = session.handle_channel_event(ChannelEvent::Server(ServerEvent::Progress {
            value: 10.0,
        }));
        assert_eq!(update, SessionUpdate::Ignored);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.progress(), None);
    }

    #[tokio::test]
    async fn test_protocol_errors_do_not_end_run() {
        let (mut session, server) = postgres_session().await;
        session.start_analysis().await.unwrap();

        server.push(r#"{"type":"heartbeat"}"#);
        server.push("garbage");
        server.push(&partial(COLUMN_ID));

        assert_eq!(session.next_update().await, Some(SessionUpdate::Ignored));
        assert_eq!(session.next_update().await, Some(SessionUpdate::Ignored));
        assert_eq!(session.state(), SessionState::Requesting);
        assert!(matches!(
            session.next_update().await,
            Some(SessionUpdate::Columns { added: 1, .. })
        ));
        assert_eq!(session.state(), SessionState::Streaming);
    }

    #[tokio::test]
    async fn test_silence_timeout_fails_run() {
        let (transport, _server) = Transport::fake();
        let mut config = config();
        config.server.silence_timeout_secs = 0;
        let mut session = AnalysisSession::connect(&config, transport).await.unwrap();
        session.set_database_kind(DatabaseKind::Postgres);
        session.set_credential_field("url", "postgres://u:p@h/db").unwrap();
        session.set_credential_field("tableId", "orders").unwrap();

        session.start_analysis().await.unwrap();
        let update = session.next_update().await.unwrap();

        assert_eq!(
            update,
            SessionUpdate::Failed(RunFailure::TimedOut(Duration::from_secs(0)))
        );
        assert_eq!(session.state(), SessionState::Errored);
        assert!(session.result().unwrap().is_error());
    }

    #[tokio::test]
    async fn test_disconnect_mid_run_then_lazy_reconnect() {
        let (mut session, server) = postgres_session().await;
        session.start_analysis().await.unwrap();

        server.drop_connection("backend restarted");
        let update = session.next_update().await.unwrap();
        assert!(matches!(
            update,
            SessionUpdate::Failed(RunFailure::Disconnected(_))
        ));
        assert_eq!(session.state(), SessionState::Errored);
        assert_eq!(session.connection_status(), ConnectionStatus::Disconnected);

        session.start_analysis().await.unwrap();
        assert_eq!(server.connections(), 2);
        assert_eq!(session.state(), SessionState::Requesting);
        assert_eq!(session.connection_status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_send_failure_errors_run() {
        let (transport, server) = Transport::fake();
        server.refuse_all(true);
        let mut session = AnalysisSession::connect(&config(), transport).await.unwrap();
        assert_eq!(session.connection_status(), ConnectionStatus::Disconnected);

        session.set_database_kind(DatabaseKind::Postgres);
        session.set_credential_field("url", "postgres://u:p@h/db").unwrap();
        session.set_credential_field("tableId", "orders").unwrap();

        let err = session.start_analysis().await.unwrap_err();
        assert!(matches!(err, StartError::Transport(_)));
        assert_eq!(session.state(), SessionState::Errored);
        assert!(matches!(session.failure(), Some(RunFailure::SendFailed(_))));
        assert_eq!(session.next_update().await, None);
    }

    #[tokio::test]
    async fn test_snapshot_published_to_observers() {
        let (mut session, server) = postgres_session().await;
        let mut observer = session.subscribe();
        let _ = observer.borrow_and_update();

        server.reply_with([r#"{"type":"progress","value":40}"#]);
        session.start_analysis().await.unwrap();
        assert!(observer.has_changed().unwrap());
        assert_eq!(observer.borrow_and_update().state, SessionState::Requesting);

        session.next_update().await.unwrap();
        let snapshot = observer.borrow_and_update().clone();
        assert_eq!(snapshot.state, SessionState::Streaming);
        assert_eq!(snapshot.progress, Some(40.0));
        assert_eq!(snapshot.connection, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_shutdown_closes_once() {
        let (mut session, server) = postgres_session().await;
        session.shutdown().await;
        session.shutdown().await;
        assert_eq!(server.closes(), 1);
        assert_eq!(session.connection_status(), ConnectionStatus::Disconnected);
        assert_eq!(session.next_update().await, None);
    }
}

//! TypeLens Core
//!
//! I/O-free building blocks of the analysis session: the result document,
//! the wire protocol, the settings store, the run state machine and the
//! aggregator that folds server events into one result.

pub mod aggregator;
pub mod errors;
pub mod model;
pub mod protocol;
pub mod settings;
pub mod state;

pub use aggregator::{Applied, ResultAggregator};
pub use errors::{ProtocolError, SettingsError, TransitionError};
pub use model::{
    AnalysisData, AnalysisResult, AnalysisStatus, ColumnAnalysis, ConfidenceDetails,
    ConfidenceDistribution, MethodConfidence, Metadata, RunSeed, SampleInfo, Summary, TableInfo,
};
pub use protocol::{decode_server_event, ClientMessage, ErrorPayload, ServerEvent};
pub use settings::{
    AnalysisSettings, CredentialField, Credentials, DatabaseKind, LimitChange, ValidatedRequest,
};
pub use state::{SessionState, SessionStateMachine, Transition};

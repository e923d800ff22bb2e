//! Analysis session
//!
//! The facade the rest of the application depends on: settings, state,
//! result and the single mutating operation `start_analysis`.

pub mod analysis_session;
pub mod errors;
pub mod events;

pub use analysis_session::AnalysisSession;
pub use errors::{RunFailure, StartError};
pub use events::{SessionSnapshot, SessionUpdate};

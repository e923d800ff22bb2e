//! CLI module
//!
//! Provides:
//! - Argument parsing (clap)
//! - Command dispatch (analyze, show-config)

pub mod args;
pub mod dispatch;

pub use args::{AnalyzeArgs, Cli, Command, Step};
pub use dispatch::{run_analyze, show_config, ExitCode};

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Invalid analysis settings: {0}")]
    Settings(#[from] typelens_core::SettingsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Exit codes (deterministic)
pub const EXIT_SUCCESS: i32 = 0;
/// Run errored, or the request was rejected locally
pub const EXIT_FAILURE: i32 = 1;
/// Backend unreachable or link lost
pub const EXIT_CONNECTION_ERROR: i32 = 2;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, Error>;

//! CLI argument parsing
//!
//! ```text
//! typelens [--config FILE] [--server URL] [--log-level L] [--json-logs] <command>
//!
//! COMMANDS:
//!   analyze      Run one analysis and print the result document
//!   show-config  Print the effective client configuration
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use typelens_core::{DatabaseKind, LimitChange};

use crate::config::ClientConfig;
use crate::session::AnalysisSession;

/// Streaming column-type analysis client
#[derive(Debug, Parser)]
#[command(name = "typelens", version, about)]
pub struct Cli {
    /// Client configuration file (default: ./typelens.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend WebSocket URL
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Log level or filter directive
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one analysis and print the result document
    Analyze(AnalyzeArgs),
    /// Print the effective client configuration (secrets masked)
    ShowConfig,
}

/// Row-limit step direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Step {
    Up,
    Down,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// postgres, mysql or bigquery
    #[arg(long)]
    pub db_kind: Option<DatabaseKind>,

    /// Connection URL (postgres/mysql)
    #[arg(long)]
    pub url: Option<String>,

    /// Table to analyse
    #[arg(long)]
    pub table: Option<String>,

    /// Any credential field, e.g. --field projectId=acme
    #[arg(long = "field", value_name = "NAME=VALUE", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,

    /// Row-sample limit, clamped to [10, 10000]
    #[arg(long, allow_hyphen_values = true, conflicts_with = "step")]
    pub limit: Option<i64>,

    /// Step the configured row-sample limit by 10
    #[arg(long, value_enum)]
    pub step: Option<Step>,

    /// Print the result on one line
    #[arg(long)]
    pub compact: bool,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

impl Cli {
    /// Global flags override file and environment values
    pub fn apply_to(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.server {
            config.server.url = url.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}

impl AnalyzeArgs {
    /// Push the command-line settings into the session's store
    pub fn apply(&self, session: &mut AnalysisSession) -> crate::cli::Result<()> {
        if let Some(kind) = self.db_kind {
            session.set_database_kind(kind);
        }
        if let Some(url) = &self.url {
            session.set_credential_field("url", url.clone())?;
        }
        if let Some(table) = &self.table {
            session.set_credential_field("tableId", table.clone())?;
        }
        for (name, value) in &self.fields {
            session.set_credential_field(name, value.clone())?;
        }
        if let Some(change) = self.limit_change() {
            session.set_sample_row_limit(change);
        }
        Ok(())
    }

    pub fn limit_change(&self) -> Option<LimitChange> {
        match (self.limit, self.step) {
            (Some(limit), _) => Some(LimitChange::Override(limit)),
            (None, Some(Step::Up)) => Some(LimitChange::Increment),
            (None, Some(Step::Down)) => Some(LimitChange::Decrement),
            (None, None) => None,
        }
    }
}

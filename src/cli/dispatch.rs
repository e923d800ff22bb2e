//! CLI command dispatch
//!
//! Runs one command and maps its outcome to an exit code.

use std::io::Write;

use tracing::{error, info};
use typelens_core::SessionState;

use crate::channel::{ConnectionStatus, Transport};
use crate::cli::{AnalyzeArgs, Result, EXIT_CONNECTION_ERROR, EXIT_FAILURE, EXIT_SUCCESS};
use crate::config::ClientConfig;
use crate::session::{AnalysisSession, SessionUpdate, StartError};

/// Exit code wrapper for CLI operations
pub type ExitCode = i32;

/// Run one analysis and write the result document to `out`
pub async fn run_analyze<W: Write>(
    config: &ClientConfig,
    args: &AnalyzeArgs,
    transport: Transport,
    out: &mut W,
) -> ExitCode {
    let mut session = match AnalysisSession::connect(config, transport).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_FAILURE;
        }
    };

    let code = drive(&mut session, args, out).await;
    session.shutdown().await;
    code
}

async fn drive<W: Write>(session: &mut AnalysisSession, args: &AnalyzeArgs, out: &mut W) -> ExitCode {
    if session.connection_status() != ConnectionStatus::Connected {
        eprintln!("Error: could not connect to the analysis backend");
        return EXIT_CONNECTION_ERROR;
    }

    if let Err(e) = args.apply(session) {
        eprintln!("Error: {}", e);
        return EXIT_FAILURE;
    }

    match session.start_analysis().await {
        Ok(request_id) => info!(%request_id, "waiting for results"),
        Err(StartError::Transport(e)) => {
            eprintln!("Error: {}", e);
            return EXIT_CONNECTION_ERROR;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_FAILURE;
        }
    }

    while let Some(update) = session.next_update().await {
        match &update {
            SessionUpdate::Progress(value) => info!(progress = value, "analysis progress"),
            SessionUpdate::Columns { total, .. } => info!(columns = total, "partial results"),
            _ => {}
        }
        if update.is_terminal() {
            break;
        }
    }

    if let Err(e) = write_result(session, args.compact, out) {
        error!(error = %e, "could not write result");
        return EXIT_FAILURE;
    }

    match session.state() {
        SessionState::Completed => EXIT_SUCCESS,
        _ => {
            let failure = session.failure();
            if let Some(failure) = failure {
                eprintln!("Error: {}", failure);
            }
            match failure {
                Some(failure) if failure.is_transport() => EXIT_CONNECTION_ERROR,
                _ => EXIT_FAILURE,
            }
        }
    }
}

fn write_result<W: Write>(session: &AnalysisSession, compact: bool, out: &mut W) -> Result<()> {
    let Some(result) = session.result() else {
        return Ok(());
    };
    let text = if compact {
        serde_json::to_string(result)?
    } else {
        serde_json::to_string_pretty(result)?
    };
    writeln!(out, "{}", text)?;
    Ok(())
}

/// Print the effective configuration with secrets masked
pub fn show_config<W: Write>(config: &ClientConfig, out: &mut W) -> Result<()> {
    let text = config.redacted().to_toml()?;
    write!(out, "{}", text)?;
    Ok(())
}

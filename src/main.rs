//! TypeLens CLI
//!
//! Exit codes: 0 completed, 1 run errored or request rejected,
//! 2 backend unreachable or link lost.

use anyhow::Context;
use clap::Parser;

use typelens::channel::Transport;
use typelens::cli::{run_analyze, show_config, Cli, Command, EXIT_FAILURE, EXIT_SUCCESS};
use typelens::config::ClientConfig;
use typelens::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match ClientConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };
    cli.apply_to(&mut config);

    let guard = init_logging(&config.logging).context("failed to initialise logging")?;

    let mut stdout = std::io::stdout().lock();
    let code = match &cli.command {
        Command::ShowConfig => {
            show_config(&config, &mut stdout)?;
            EXIT_SUCCESS
        }
        Command::Analyze(args) => {
            run_analyze(&config, args, Transport::default(), &mut stdout).await
        }
    };

    // Flush buffered log lines before exiting
    drop(guard);
    std::process::exit(code);
}

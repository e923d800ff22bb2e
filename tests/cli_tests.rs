//! CLI wiring tests
//!
//! Parses real argument vectors and runs the analyze command against the
//! fake transport, checking exit codes and printed output.

use clap::Parser;

use typelens::channel::Transport;
use typelens::cli::{
    run_analyze, show_config, AnalyzeArgs, Cli, Command, EXIT_CONNECTION_ERROR, EXIT_FAILURE,
    EXIT_SUCCESS,
};
use typelens::config::ClientConfig;

const DONE_ORDERS: &str = include_str!("fixtures/done_orders.json");
const PARTIAL_ID: &str = include_str!("fixtures/partial_id.json");
const ERROR_DB_TIMEOUT: &str = include_str!("fixtures/error_db_timeout.json");

fn analyze_args(extra: &[&str]) -> AnalyzeArgs {
    let mut argv = vec!["typelens", "analyze"];
    argv.extend_from_slice(extra);
    match Cli::try_parse_from(argv).unwrap().command {
        Command::Analyze(args) => args,
        Command::ShowConfig => panic!("expected analyze"),
    }
}

fn postgres_args() -> AnalyzeArgs {
    analyze_args(&[
        "--db-kind",
        "postgres",
        "--url",
        "postgresql://analyst:pw@db:5432/shop",
        "--table",
        "orders",
        "--compact",
    ])
}

fn config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.server.url = "ws://fake-backend".to_string();
    config.server.reconnect.max_attempts = 1;
    config.server.silence_timeout_secs = 5;
    config
}

#[tokio::test]
async fn test_analyze_completed_prints_result() {
    let (transport, server) = Transport::fake();
    server.reply_with([PARTIAL_ID, DONE_ORDERS]);

    let mut out = Vec::new();
    let code = run_analyze(&config(), &postgres_args(), transport, &mut out).await;

    assert_eq!(code, EXIT_SUCCESS);
    let printed: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(printed["status"], "success");
    assert_eq!(
        printed["data"]["columns_analysis"].as_array().unwrap().len(),
        5
    );
    assert_eq!(server.closes(), 1);
}

#[tokio::test]
async fn test_analyze_backend_error_exit_code() {
    let (transport, server) = Transport::fake();
    server.reply_with([PARTIAL_ID, ERROR_DB_TIMEOUT]);

    let mut out = Vec::new();
    let code = run_analyze(&config(), &postgres_args(), transport, &mut out).await;

    assert_eq!(code, EXIT_FAILURE);
    let printed: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(printed["status"], "error");
    assert_eq!(
        printed["data"]["columns_analysis"][0]["column_name"],
        "id"
    );
}

#[tokio::test]
async fn test_analyze_rejected_settings() {
    let (transport, server) = Transport::fake();
    let args = analyze_args(&["--db-kind", "postgres", "--table", "orders"]);

    let mut out = Vec::new();
    let code = run_analyze(&config(), &args, transport, &mut out).await;

    assert_eq!(code, EXIT_FAILURE);
    assert!(out.is_empty());
    assert!(server.sent().is_empty());
}

#[tokio::test]
async fn test_analyze_field_not_applicable() {
    let (transport, _server) = Transport::fake();
    let args = analyze_args(&["--db-kind", "mysql", "--field", "projectId=acme"]);

    let mut out = Vec::new();
    let code = run_analyze(&config(), &args, transport, &mut out).await;
    assert_eq!(code, EXIT_FAILURE);
}

#[tokio::test]
async fn test_analyze_unreachable_backend() {
    let (transport, server) = Transport::fake();
    server.refuse_all(true);

    let mut out = Vec::new();
    let code = run_analyze(&config(), &postgres_args(), transport, &mut out).await;

    assert_eq!(code, EXIT_CONNECTION_ERROR);
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_analyze_connection_lost_mid_run() {
    let (transport, server) = Transport::fake();
    server.reply_with([PARTIAL_ID]);
    let dropper = server.clone();
    let watcher = tokio::spawn(async move {
        while dropper.sent().is_empty() {
            tokio::task::yield_now().await;
        }
        dropper.drop_connection("backend restarted");
    });

    let mut out = Vec::new();
    let code = run_analyze(&config(), &postgres_args(), transport, &mut out).await;
    watcher.await.unwrap();

    assert_eq!(code, EXIT_CONNECTION_ERROR);
}

#[test]
fn test_show_config_masks_secrets() {
    let config = ClientConfig::from_toml(
        r#"
[analysis]
database_kind = "bigquery"

[analysis.credentials.bigquery]
projectId = "acme"
gcpServiceKey = "super-secret-key"
"#,
    )
    .unwrap();

    let mut out = Vec::new();
    show_config(&config, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("ws://localhost:3001"));
    assert!(text.contains("acme"));
    assert!(!text.contains("super-secret-key"));
}

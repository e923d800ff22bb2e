//! WebSocket transport integration tests
//!
//! Runs the session against a real local server built on
//! tokio-tungstenite's `accept_async`.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use typelens::channel::{ConnectionStatus, Transport};
use typelens::config::ClientConfig;
use typelens::session::{AnalysisSession, RunFailure};
use typelens::typelens_core::{DatabaseKind, SessionState};

const PARTIAL_ID: &str = include_str!("fixtures/partial_id.json");
const DONE_ORDERS: &str = include_str!("fixtures/done_orders.json");

/// How the scripted backend behaves after receiving `start_analysis`
#[derive(Clone, Copy)]
enum Script {
    Complete,
    HangUp,
}

/// Accept one client, answer its first request per `script`, return what it sent
async fn spawn_backend(script: Script) -> (String, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut received = Vec::new();

        while let Some(Ok(message)) = socket.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            received.push(text.to_string());
            match script {
                Script::Complete => {
                    socket
                        .send(Message::Text(r#"{"type":"progress","value":10}"#.into()))
                        .await
                        .unwrap();
                    socket.send(Message::Text(PARTIAL_ID.into())).await.unwrap();
                    socket.send(Message::Text(DONE_ORDERS.into())).await.unwrap();
                }
                Script::HangUp => {
                    socket.send(Message::Text(PARTIAL_ID.into())).await.unwrap();
                    let _ = socket.close(None).await;
                    break;
                }
            }
        }
        received
    });

    (url, handle)
}

async fn session_for(url: &str) -> AnalysisSession {
    let mut config = ClientConfig::default();
    config.server.url = url.to_string();
    config.server.connect_timeout_secs = 2;
    config.server.silence_timeout_secs = 5;
    config.server.reconnect.max_attempts = 1;

    let mut session = AnalysisSession::connect(&config, Transport::default())
        .await
        .unwrap();
    session.set_database_kind(DatabaseKind::Postgres);
    session
        .set_credential_field("url", "postgresql://analyst:pw@db:5432/shop")
        .unwrap();
    session.set_credential_field("tableId", "orders").unwrap();
    session
}

#[tokio::test]
async fn test_websocket_run_completes() {
    let (url, backend) = spawn_backend(Script::Complete).await;
    let mut session = session_for(&url).await;
    assert_eq!(session.connection_status(), ConnectionStatus::Connected);

    let request_id = session.start_analysis().await.unwrap();
    let state = tokio::time::timeout(Duration::from_secs(10), session.run_until_terminal())
        .await
        .unwrap();

    assert_eq!(state, SessionState::Completed);
    assert_eq!(session.result().unwrap().columns().len(), 5);
    assert_eq!(session.progress(), Some(10.0));

    session.shutdown().await;
    let received = backend.await.unwrap();
    assert_eq!(received.len(), 1);
    let message: serde_json::Value = serde_json::from_str(&received[0]).unwrap();
    assert_eq!(message["type"], "start_analysis");
    assert_eq!(message["params"]["requestId"], request_id.to_string());
    assert_eq!(message["params"]["dbType"], "postgres");
}

#[tokio::test]
async fn test_websocket_hang_up_mid_run() {
    let (url, backend) = spawn_backend(Script::HangUp).await;
    let mut session = session_for(&url).await;

    session.start_analysis().await.unwrap();
    let state = tokio::time::timeout(Duration::from_secs(10), session.run_until_terminal())
        .await
        .unwrap();

    assert_eq!(state, SessionState::Errored);
    assert!(matches!(
        session.failure(),
        Some(RunFailure::Disconnected(_))
    ));
    // the fragment that arrived before the hang-up is kept
    assert_eq!(session.result().unwrap().columns().len(), 1);
    assert_eq!(session.connection_status(), ConnectionStatus::Disconnected);
    backend.await.unwrap();
}

#[tokio::test]
async fn test_websocket_unreachable() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let session = session_for(&url).await;
    assert_eq!(session.connection_status(), ConnectionStatus::Disconnected);
    assert_eq!(session.state(), SessionState::Idle);
}

//! Wire protocol over the persistent channel
//!
//! Every frame is a JSON object with a `type` tag. The client sends a single
//! message kind (`start_analysis`); the server answers with `progress`,
//! `partial_result`, `done` or `error`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ProtocolError;
use crate::model::{AnalysisResult, ColumnAnalysis};
use crate::settings::{DatabaseKind, ValidatedRequest};

/// Event type tags the server is known to send
const SERVER_EVENT_KINDS: [&str; 4] = ["progress", "partial_result", "done", "error"];

/// Messages sent by the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartAnalysis { params: StartAnalysisParams },
}

/// Parameters of a `start_analysis` request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartAnalysisParams {
    pub request_id: Uuid,
    pub line_limit: u32,
    pub db_type: DatabaseKind,
    /// Credential subset for `db_type`, keyed by wire name
    pub db_config: BTreeMap<String, String>,
}

impl ClientMessage {
    pub fn start_analysis(request_id: Uuid, request: &ValidatedRequest) -> Self {
        ClientMessage::StartAnalysis {
            params: StartAnalysisParams {
                request_id,
                line_limit: request.sample_row_limit,
                db_type: request.kind,
                db_config: request.fields.clone(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Events pushed by the analysis backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Completion indicator, passed through to observers
    Progress { value: f64 },
    /// Newly analysed columns
    PartialResult { payload: Vec<ColumnAnalysis> },
    /// Complete, authoritative result
    Done { payload: Box<AnalysisResult> },
    /// Backend-reported failure
    Error { payload: ErrorPayload },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Progress { .. } => "progress",
            ServerEvent::PartialResult { .. } => "partial_result",
            ServerEvent::Done { .. } => "done",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// Ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerEvent::Done { .. } | ServerEvent::Error { .. })
    }
}

/// Structured failure description
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorPayload {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.to_string()),
            details: None,
        }
    }
}

/// Decode one inbound text frame
///
/// Unknown `type` tags are reported separately from malformed frames so the
/// caller can log them at a different level.
pub fn decode_server_event(text: &str) -> Result<ServerEvent, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing \"type\" tag".to_string()))?;

    if !SERVER_EVENT_KINDS.contains(&kind) {
        return Err(ProtocolError::UnknownKind(kind.to_string()));
    }

    let kind = kind.to_string();
    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(format!("{kind}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AnalysisSettings;

    const COLUMN: &str = r#"{
        "column_name": "id",
        "predicted_type": "INTEGER",
        "expected_type": "INTEGER",
        "confidence": 0.98,
        "concordance": true,
        "samples": 100,
        "issues": [],
        "confidence_details": {
            "heuristic_rules": {"confidence": 0.99, "method": "rules", "description": "digits only"},
            "machine_learning": {"confidence": 0.97, "method": "rf", "description": "classifier", "model_version": "1.0"},
            "generative_ai": {"confidence": 0.98, "method": "llm", "description": "prompt", "model_type": "gpt"}
        }
    }"#;

    #[test]
    fn test_start_analysis_wire_shape() {
        let mut settings = AnalysisSettings::new();
        settings.set_database_kind(DatabaseKind::Postgres);
        settings
            .set_credential_field("url", "postgresql://u:p@h:5432/db")
            .unwrap();
        settings.set_credential_field("tableId", "orders").unwrap();
        let request = settings.validate().unwrap();

        let id = Uuid::new_v4();
        let json = ClientMessage::start_analysis(id, &request).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "start_analysis");
        assert_eq!(value["params"]["requestId"], id.to_string());
        assert_eq!(value["params"]["lineLimit"], 100);
        assert_eq!(value["params"]["dbType"], "postgres");
        assert_eq!(value["params"]["dbConfig"]["tableId"], "orders");
        assert_eq!(
            value["params"]["dbConfig"]["url"],
            "postgresql://u:p@h:5432/db"
        );
    }

    #[test]
    fn test_decode_progress() {
        let event = decode_server_event(r#"{"type":"progress","value":42.5}"#).unwrap();
        assert_eq!(event, ServerEvent::Progress { value: 42.5 });
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_decode_partial_result() {
        let frame = format!(r#"{{"type":"partial_result","payload":[{COLUMN}]}}"#);
        match decode_server_event(&frame).unwrap() {
            ServerEvent::PartialResult { payload } => {
                assert_eq!(payload.len(), 1);
                assert_eq!(payload[0].column_name, "id");
                assert!(payload[0].concordance);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_decode_error() {
        let event = decode_server_event(
            r#"{"type":"error","payload":{"message":"connection refused","code":"DB_CONNECT"}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::Error { payload } => {
                assert_eq!(payload.message, "connection refused");
                assert_eq!(payload.code.as_deref(), Some("DB_CONNECT"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_kind() {
        let err = decode_server_event(r#"{"type":"heartbeat"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownKind("heartbeat".to_string()));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            decode_server_event("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_server_event(r#"{"value": 1}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_server_event(r#"{"type":"progress","value":"half"}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_server_event(r#"{"type":"partial_result","payload":[{"column_name":"x"}]}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }
}

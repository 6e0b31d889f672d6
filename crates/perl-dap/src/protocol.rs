//! DAP wire envelopes. Request arguments stay as raw JSON values; each
//! handler picks out what it needs, with [`LaunchArguments`] as the one
//! fully typed payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Incoming message envelope.
#[derive(Debug, Deserialize)]
pub struct DapRequest {
    pub seq: u64,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub command: Option<String>,
    pub arguments: Option<serde_json::Value>,
}

/// Outgoing response envelope.
#[derive(Debug, Serialize)]
pub struct DapResponse {
    pub seq: u64,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub request_seq: u64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Outgoing event envelope.
#[derive(Debug, Serialize)]
pub struct DapEvent {
    pub seq: u64,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl DapResponse {
    pub fn success(
        seq: u64,
        request_seq: u64,
        command: &str,
        body: Option<serde_json::Value>,
    ) -> Self {
        DapResponse {
            seq,
            msg_type: "response".to_string(),
            request_seq,
            success: true,
            command: command.to_string(),
            message: None,
            body,
        }
    }

    pub fn error(seq: u64, request_seq: u64, command: &str, message: &str) -> Self {
        DapResponse {
            seq,
            msg_type: "response".to_string(),
            request_seq,
            success: false,
            command: command.to_string(),
            message: Some(message.to_string()),
            body: None,
        }
    }

    /// Error response carrying a structured `Message` body with a numeric
    /// id, e.g. 1001 for a missing launch program.
    pub fn error_with_id(
        seq: u64,
        request_seq: u64,
        command: &str,
        id: u32,
        format: &str,
    ) -> Self {
        DapResponse {
            seq,
            msg_type: "response".to_string(),
            request_seq,
            success: false,
            command: command.to_string(),
            message: Some(format.to_string()),
            body: Some(serde_json::json!({
                "error": { "id": id, "format": format }
            })),
        }
    }
}

impl DapEvent {
    pub fn new(seq: u64, event: &str, body: Option<serde_json::Value>) -> Self {
        DapEvent {
            seq,
            msg_type: "event".to_string(),
            event: event.to_string(),
            body,
        }
    }
}

/// Arguments of the `launch` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    pub program: Option<String>,
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Space-split into the debuggee's argv.
    pub args: Option<String>,
    #[serde(default)]
    pub stop_on_entry: bool,
    #[serde(default)]
    pub trace: bool,
}

impl LaunchArguments {
    pub fn argv(&self) -> Vec<String> {
        self.args
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_with_and_without_arguments() {
        let msg: DapRequest =
            serde_json::from_str(r#"{"seq":1,"type":"request","command":"initialize"}"#).unwrap();
        assert_eq!(msg.command.as_deref(), Some("initialize"));
        assert!(msg.arguments.is_none());

        let msg: DapRequest = serde_json::from_str(
            r#"{"seq":2,"type":"request","command":"launch","arguments":{"program":"/x.pl"}}"#,
        )
        .unwrap();
        assert_eq!(msg.arguments.unwrap()["program"], "/x.pl");
    }

    #[test]
    fn success_response_omits_message() {
        let resp = DapResponse::success(3, 2, "threads", None);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "response");
        assert_eq!(json["success"], true);
        assert!(json.get("message").is_none());
    }

    #[test]
    fn error_with_id_carries_structured_body() {
        let resp = DapResponse::error_with_id(1, 1, "launch", 1001, "No program specified to debug.");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["body"]["error"]["id"], 1001);
        assert_eq!(json["body"]["error"]["format"], "No program specified to debug.");
    }

    #[test]
    fn launch_arguments_defaults() {
        let args: LaunchArguments = serde_json::from_str(r#"{"program":"/s.pl"}"#).unwrap();
        assert_eq!(args.program.as_deref(), Some("/s.pl"));
        assert!(!args.stop_on_entry);
        assert!(args.argv().is_empty());

        let args: LaunchArguments = serde_json::from_str(
            r#"{"program":"/s.pl","args":"--fast  one two","stopOnEntry":true}"#,
        )
        .unwrap();
        assert_eq!(args.argv(), vec!["--fast", "one", "two"]);
        assert!(args.stop_on_entry);
    }
}

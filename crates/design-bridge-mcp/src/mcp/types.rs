//! JSON-RPC 2.0 envelopes and the MCP payloads we use.

use design_bridge_core::{RemoteError, ToolArgs, ToolOutput, ToolSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// MCP revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Outgoing request.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    #[must_use]
    pub const fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

/// Outgoing notification (no id, no reply).
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcNotification<'a> {
    #[must_use]
    pub const fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

/// Our reply to a request initiated by the server.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    #[must_use]
    pub const fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub const fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const METHOD_NOT_FOUND: i64 = -32601;

    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Any line read from the server, before classification.
#[derive(Debug, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// A classified incoming message.
#[derive(Debug)]
pub enum Incoming {
    /// Reply to one of our requests.
    Response {
        id: u64,
        outcome: Result<Value, JsonRpcError>,
    },
    /// Request initiated by the server.
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    /// Fire-and-forget message from the server.
    Notification {
        method: String,
        params: Option<Value>,
    },
    /// Valid JSON that fits none of the above.
    Unknown,
}

impl From<RawMessage> for Incoming {
    fn from(raw: RawMessage) -> Self {
        match (raw.id, raw.method) {
            (Some(id), Some(method)) if !id.is_null() => Self::Request {
                id,
                method,
                params: raw.params,
            },
            (_, Some(method)) => Self::Notification {
                method,
                params: raw.params,
            },
            (Some(Value::Number(n)), None) => match n.as_u64() {
                Some(id) => Self::Response {
                    id,
                    outcome: match raw.error {
                        Some(error) => Err(error),
                        None => Ok(raw.result.unwrap_or(Value::Null)),
                    },
                },
                None => Self::Unknown,
            },
            _ => Self::Unknown,
        }
    }
}

/// Client or server name/version pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

/// `initialize` request parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: Implementation,
}

/// `initialize` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub server_info: Option<Implementation>,
}

/// `tools/list` result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// `tools/call` request parameters.
#[derive(Debug, Serialize)]
pub struct CallToolParams<'a> {
    pub name: &'a str,
    pub arguments: ToolArgs,
}

/// `tools/call` result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// Normalize into a tool output, or a rejection if the tool reported an
    /// error.
    ///
    /// # Errors
    /// Returns `RemoteError::Rejected` carrying the tool's own text when
    /// `isError` is set.
    pub fn into_output(self) -> Result<ToolOutput, RemoteError> {
        let texts: Option<Vec<&str>> = self
            .content
            .iter()
            .map(|item| match item.get("type").and_then(Value::as_str) {
                Some("text") => item.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect();

        if self.is_error {
            let message = texts
                .map(|t| t.join("\n"))
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Tool call failed".to_string());
            return Err(RemoteError::Rejected(message));
        }

        match texts {
            Some(t) if !t.is_empty() => Ok(ToolOutput::Text(t.join("\n"))),
            _ => Ok(ToolOutput::Structured(
                self.structured_content
                    .unwrap_or(Value::Array(self.content)),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn classify(value: Value) -> Incoming {
        Incoming::from(serde_json::from_value::<RawMessage>(value).unwrap())
    }

    #[test]
    fn request_omits_missing_params() {
        let json = serde_json::to_string(&JsonRpcRequest::new(7, "tools/list", None)).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#);
    }

    #[test]
    fn classifies_responses_requests_and_notifications() {
        assert!(matches!(
            classify(json!({ "jsonrpc": "2.0", "id": 3, "result": { "ok": true } })),
            Incoming::Response { id: 3, outcome: Ok(_) }
        ));
        assert!(matches!(
            classify(json!({ "jsonrpc": "2.0", "id": 4, "error": { "code": -32602, "message": "bad" } })),
            Incoming::Response { id: 4, outcome: Err(JsonRpcError { code: -32602, .. }) }
        ));
        assert!(matches!(
            classify(json!({ "jsonrpc": "2.0", "id": "srv-1", "method": "ping" })),
            Incoming::Request { ref method, .. } if method == "ping"
        ));
        assert!(matches!(
            classify(json!({ "jsonrpc": "2.0", "method": "notifications/message", "params": {} })),
            Incoming::Notification { .. }
        ));
        assert!(matches!(classify(json!({ "jsonrpc": "2.0" })), Incoming::Unknown));
    }

    #[test]
    fn text_content_becomes_text_output() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "Created frame \"F\"." },
                { "type": "text", "text": "ID: 12:34" }
            ]
        }))
        .unwrap();
        assert_eq!(
            result.into_output().unwrap(),
            ToolOutput::Text("Created frame \"F\".\nID: 12:34".into())
        );
    }

    #[test]
    fn mixed_content_becomes_structured_output() {
        let content = json!([
            { "type": "text", "text": "selection" },
            { "type": "image", "data": "aGk=", "mimeType": "image/png" }
        ]);
        let result: CallToolResult =
            serde_json::from_value(json!({ "content": content.clone() })).unwrap();
        assert_eq!(result.into_output().unwrap(), ToolOutput::Structured(content));
    }

    #[test]
    fn error_flag_becomes_rejection_with_verbatim_text() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{ "type": "text", "text": "Error creating frame: Plugin not connected" }],
            "isError": true
        }))
        .unwrap();
        assert_eq!(
            result.into_output(),
            Err(RemoteError::Rejected("Error creating frame: Plugin not connected".into()))
        );
    }
}

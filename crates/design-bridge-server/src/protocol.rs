//! HTTP request and response bodies.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use design_bridge_llm::ChatMessage;
use design_bridge_session::Phase;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /chat` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Earlier turns, oldest first. Each request is otherwise stateless.
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
}

impl ChatRequest {
    /// Conversation for the agent: history, then the new message.
    #[must_use]
    pub fn into_messages(self) -> Vec<ChatMessage> {
        let mut messages: Vec<_> = self
            .history
            .into_iter()
            .map(HistoryTurn::into_message)
            .collect();
        messages.push(ChatMessage::user(self.message));
        messages
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A prior turn supplied by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: TurnRole,
    pub content: String,
}

impl HistoryTurn {
    fn into_message(self) -> ChatMessage {
        match self.role {
            TurnRole::User => ChatMessage::user(self.content),
            TurnRole::Assistant => ChatMessage::assistant(self.content),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `GET /health` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub phase: Phase,
    pub root_frame_id: Option<String>,
    pub tool_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolInfo>,
}

/// Encode an uploaded image as a `data:` URL.
#[must_use]
pub fn image_data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(data))
}

#[cfg(test)]
mod tests {
    use design_bridge_llm::Role;
    use serde_json::json;

    use super::*;

    #[test]
    fn history_precedes_message() {
        let request: ChatRequest = serde_json::from_value(json!({
            "message": "make it blue",
            "history": [
                { "role": "user", "content": "create a login screen" },
                { "role": "assistant", "content": "Done, frame 1:2" }
            ]
        }))
        .unwrap();

        let messages = request.into_messages();
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages[2].text(), "make it blue");
    }

    #[test]
    fn history_is_optional() {
        let request: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(request.into_messages().len(), 1);
    }

    #[test]
    fn encodes_data_url() {
        assert_eq!(image_data_url("image/png", b"hi"), "data:image/png;base64,aGk=");
    }

    #[test]
    fn health_serializes_phase() {
        let body = HealthResponse {
            phase: Phase::Running,
            root_frame_id: None,
            tool_count: 3,
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({ "phase": "running", "root_frame_id": null, "tool_count": 3 })
        );
    }
}

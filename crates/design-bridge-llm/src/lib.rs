//! OpenAI-compatible chat completions client with tool calling.
//!
//! Provides:
//! - Chat message, tool call and tool definition types
//! - `ChatModel` trait and the `OpenAiClient` implementation

pub mod client;
pub mod types;

pub use client::{ChatModel, Completion, LlmError, OpenAiClient, OpenAiConfig};
pub use types::{ChatMessage, ContentPart, MessageContent, Role, ToolCall, ToolDefinition};

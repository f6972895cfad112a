//! Structured outcome of one tool invocation.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::ToolOutput;

/// Tagged outcome of one tool call.
///
/// Callers must branch on the tag; nothing below the HTTP boundary turns a
/// failed call into a panic or an `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    /// The remote call succeeded.
    Success {
        /// Raw remote output.
        data: ToolOutput,
        /// Session root frame at the time the call returned. Only reported for
        /// textual outputs.
        root_frame_id: Option<String>,
    },
    /// The call failed or the tool does not exist.
    Error {
        /// Failure message, verbatim from the remote when it produced one.
        message: String,
    },
}

impl InvocationResult {
    /// Build an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether the call succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Root frame reported alongside a textual success.
    #[must_use]
    pub fn root_frame_id(&self) -> Option<&str> {
        match self {
            Self::Success { root_frame_id, .. } => root_frame_id.as_deref(),
            Self::Error { .. } => None,
        }
    }

    /// Render for a model tool message.
    #[must_use]
    pub fn to_model_text(&self) -> String {
        match self {
            Self::Success { data, .. } => data.to_model_text(),
            Self::Error { message } => format!("Error: {message}"),
        }
    }
}

impl Serialize for InvocationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success {
                data,
                root_frame_id,
            } => {
                let textual = data.as_text().is_some();
                let mut map = serializer.serialize_map(Some(if textual { 3 } else { 2 }))?;
                map.serialize_entry("status", "success")?;
                map.serialize_entry("data", &data.clone().into_value())?;
                // Structured outputs never carry the root frame field.
                if textual {
                    map.serialize_entry("root_frame_id", root_frame_id)?;
                }
                map.end()
            }
            Self::Error { message } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("status", "error")?;
                map.serialize_entry("message", message)?;
                map.end()
            }
        }
    }
}

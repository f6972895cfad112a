//! Remote tool descriptions and call outputs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One operation advertised by the remote design-tool server.
///
/// The input schema is passed through untouched; arguments are never
/// validated locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool name.
    pub name: String,

    /// Human readable description, forwarded to the model.
    #[serde(default)]
    pub description: String,

    /// JSON schema of the argument object.
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

impl ToolSpec {
    /// Create a spec with an empty object schema.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: empty_object_schema(),
        }
    }

    /// Replace the input schema.
    #[must_use]
    pub fn with_schema(mut self, input_schema: Value) -> Self {
        self.input_schema = input_schema;
        self
    }
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Raw output of a successful remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Plain text, the common case for design-tool operations.
    Text(String),
    /// Anything that is not purely textual.
    Structured(Value),
}

impl ToolOutput {
    /// Borrow the text, if this is a textual result.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    /// Convert into a JSON value for serialization.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Text(text) => Value::String(text),
            Self::Structured(value) => value,
        }
    }

    /// Render as a string suitable for feeding back to a model.
    #[must_use]
    pub fn to_model_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_defaults_schema_when_missing() {
        let spec: ToolSpec = serde_json::from_str(r#"{"name":"get_selection"}"#).unwrap();
        assert_eq!(spec.name, "get_selection");
        assert!(spec.description.is_empty());
        assert_eq!(spec.input_schema["type"], "object");
    }

    #[test]
    fn spec_reads_wire_schema_field() {
        let spec: ToolSpec = serde_json::from_value(serde_json::json!({
            "name": "create_frame",
            "description": "Create a frame",
            "inputSchema": { "type": "object", "required": ["x", "y"] }
        }))
        .unwrap();
        assert_eq!(spec.input_schema["required"][1], "y");
    }

    #[test]
    fn structured_output_has_no_text() {
        let output = ToolOutput::Structured(serde_json::json!({ "nodes": [] }));
        assert!(output.as_text().is_none());
        assert_eq!(output.to_model_text(), r#"{"nodes":[]}"#);
    }
}

//! MCP client on top of the JSON-RPC peer.

use async_trait::async_trait;
use design_bridge_core::{RemoteError, ToolArgs, ToolOutput, ToolSpec, ToolTransport};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::protocol::ProtocolPeer;
use super::types::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    ListToolsResult, PROTOCOL_VERSION,
};

/// Upper bound on `tools/list` pages, in case a server keeps returning cursors.
const MAX_LIST_PAGES: usize = 64;

/// MCP client session.
pub struct McpClient {
    peer: ProtocolPeer,
    client_info: Implementation,
}

impl McpClient {
    /// Create a client over an already spawned peer.
    #[must_use]
    pub fn new(peer: ProtocolPeer) -> Self {
        Self {
            peer,
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Perform the `initialize` handshake.
    ///
    /// # Errors
    /// Returns error if the server rejects or never answers the handshake.
    pub async fn initialize(&self) -> Result<InitializeResult, RemoteError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: self.client_info.clone(),
        };
        let result: InitializeResult = self
            .request_typed("initialize", Some(to_params(&params)?))
            .await?;

        tracing::info!(
            protocol_version = %result.protocol_version,
            server = ?result.server_info,
            "MCP session initialized"
        );

        self.peer
            .notify("notifications/initialized", None)
            .await
            .map_err(RemoteError::from)?;

        Ok(result)
    }

    /// Close the protocol session.
    ///
    /// # Errors
    /// Returns error if the write side did not shut down cleanly.
    pub async fn close(&self) -> Result<(), RemoteError> {
        self.peer.close().await.map_err(RemoteError::from)
    }

    async fn request_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, RemoteError> {
        let value = self.peer.request(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| RemoteError::Protocol(format!("Malformed {method} result: {e}")))
    }
}

fn to_params<T: serde::Serialize>(params: &T) -> Result<Value, RemoteError> {
    serde_json::to_value(params).map_err(|e| RemoteError::Protocol(e.to_string()))
}

#[async_trait]
impl ToolTransport for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, RemoteError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor
                .take()
                .map(|c| serde_json::json!({ "cursor": c }));
            let page: ListToolsResult = self.request_typed("tools/list", params).await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(pages = MAX_LIST_PAGES, "Stopped following tools/list cursors");
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, args: ToolArgs) -> Result<ToolOutput, RemoteError> {
        let params = CallToolParams {
            name,
            arguments: args,
        };
        let result: CallToolResult = self
            .request_typed("tools/call", Some(to_params(&params)?))
            .await?;
        result.into_output()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use super::*;

    /// Answer every request with a canned result, keyed by method.
    fn scripted_server(script: Vec<(&'static str, Value)>) -> McpClient {
        let (client_out, server_in) = tokio::io::duplex(8192);
        let (mut server_out, client_in) = tokio::io::duplex(8192);

        tokio::spawn(async move {
            let mut lines = BufReader::new(server_in).lines();
            let mut script = script.into_iter();
            while let Ok(Some(line)) = lines.next_line().await {
                let msg: Value = serde_json::from_str(&line).unwrap();
                if msg.get("id").is_none() {
                    continue;
                }
                let (method, result) = script.next().expect("unexpected request");
                assert_eq!(msg["method"], method);
                let reply = json!({ "jsonrpc": "2.0", "id": msg["id"], "result": result });
                server_out
                    .write_all(format!("{reply}\n").as_bytes())
                    .await
                    .unwrap();
            }
        });

        McpClient::new(ProtocolPeer::spawn(client_in, client_out, Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn handshake_returns_server_info() {
        let client = scripted_server(vec![(
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "TalkToFigmaMCP", "version": "1.0.0" }
            }),
        )]);
        let result = client.initialize().await.unwrap();
        assert_eq!(result.server_info.unwrap().name, "TalkToFigmaMCP");
    }

    #[tokio::test]
    async fn list_tools_follows_cursors() {
        let client = scripted_server(vec![
            (
                "tools/list",
                json!({ "tools": [{ "name": "create_frame" }], "nextCursor": "p2" }),
            ),
            ("tools/list", json!({ "tools": [{ "name": "create_text" }] })),
        ]);
        let names: Vec<_> = client
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["create_frame", "create_text"]);
    }

    #[tokio::test]
    async fn call_tool_returns_text_and_rejections() {
        let client = Arc::new(scripted_server(vec![
            (
                "tools/call",
                json!({ "content": [{ "type": "text", "text": "Created frame. ID: 12:34" }] }),
            ),
            (
                "tools/call",
                json!({ "content": [{ "type": "text", "text": "Node not found" }], "isError": true }),
            ),
        ]));

        let ok = client.call_tool("create_frame", ToolArgs::new()).await;
        assert_eq!(ok, Ok(ToolOutput::Text("Created frame. ID: 12:34".into())));

        let err = client.call_tool("delete_node", ToolArgs::new()).await;
        assert_eq!(err, Err(RemoteError::Rejected("Node not found".into())));
    }

    #[tokio::test]
    async fn malformed_listing_is_a_protocol_error() {
        let client = scripted_server(vec![("tools/list", json!({ "nope": true }))]);
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, RemoteError::Protocol(_)));
    }
}

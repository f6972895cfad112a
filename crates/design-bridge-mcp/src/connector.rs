//! Connector that launches the MCP server and opens a session on it.

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use design_bridge_core::{RemoteConnector, RemoteError, RemoteLink, ToolTransport};
use tokio::sync::Mutex;

use crate::{
    command::CommandBuilder,
    mcp::{McpClient, ProtocolPeer},
    process::StdioProcess,
};

/// How to launch and talk to the server.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Server command line, e.g. `node dist/server.js`.
    pub command: CommandBuilder,
    /// Working directory for the server process.
    pub working_dir: Option<PathBuf>,
    /// Deadline for each JSON-RPC request.
    pub request_timeout: Duration,
    /// How long to wait for a clean exit before killing the process.
    pub shutdown_grace: Duration,
}

impl McpServerConfig {
    /// Config with default timeouts.
    #[must_use]
    pub const fn new(command: CommandBuilder) -> Self {
        Self {
            command,
            working_dir: None,
            request_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Launches the server process for every new session.
pub struct McpConnector {
    config: McpServerConfig,
}

impl McpConnector {
    #[must_use]
    pub const fn new(config: McpServerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RemoteConnector for McpConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteLink>, RemoteError> {
        let (program, args) = self
            .config
            .command
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?
            .into_resolved()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let (process, stdin, stdout) =
            StdioProcess::spawn(&program, &args, self.config.working_dir.as_deref())
                .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let peer = ProtocolPeer::spawn(stdout, stdin, self.config.request_timeout);

        Ok(Box::new(McpLink {
            client: Arc::new(McpClient::new(peer)),
            process: Mutex::new(Some(process)),
            shutdown_grace: self.config.shutdown_grace,
        }))
    }
}

/// A running server process with an MCP session on its stdio.
pub struct McpLink {
    client: Arc<McpClient>,
    process: Mutex<Option<StdioProcess>>,
    shutdown_grace: Duration,
}

#[async_trait]
impl RemoteLink for McpLink {
    async fn initialize(&self) -> Result<(), RemoteError> {
        self.client.initialize().await.map(|_| ())
    }

    fn tools(&self) -> Arc<dyn ToolTransport> {
        self.client.clone()
    }

    async fn close_session(&self) -> Result<(), RemoteError> {
        self.client.close().await
    }

    async fn close_transport(&self) -> Result<(), RemoteError> {
        let Some(process) = self.process.lock().await.take() else {
            return Ok(());
        };
        process
            .terminate(self.shutdown_grace)
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_is_a_transport_error() {
        let connector = McpConnector::new(McpServerConfig::new(CommandBuilder::new(
            "/nonexistent/bin/node server.js",
        )));
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, RemoteError::Transport(ref m) if m.contains("not found")));
    }

    #[tokio::test]
    async fn echoing_process_rejects_handshake_and_closes() {
        let mut config = McpServerConfig::new(CommandBuilder::new("/bin/cat"));
        config.request_timeout = Duration::from_secs(5);
        config.shutdown_grace = Duration::from_secs(2);

        // `cat` echoes our request back, which looks like a server request;
        // the peer answers "method not found", and `cat` echoes that answer
        // back as the reply to our own request.
        let link = McpConnector::new(config).connect().await.unwrap();
        assert_eq!(
            link.initialize().await,
            Err(RemoteError::Rejected("Method not found: initialize".into()))
        );

        tokio_test::assert_ok!(link.close_session().await);
        tokio_test::assert_ok!(link.close_transport().await);
        tokio_test::assert_ok!(link.close_transport().await);
    }
}

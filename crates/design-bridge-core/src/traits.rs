//! Core traits for reaching the remote design-tool server.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{ToolOutput, ToolSpec};

/// Argument object passed to a tool.
pub type ToolArgs = Map<String, Value>;

/// Remote error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote rejected the request or the operation itself failed. The
    /// message is kept verbatim.
    #[error("{0}")]
    Rejected(String),
    /// The remote process or pipe failed.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The remote sent something we could not understand.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// No answer arrived in time.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
    /// The connection is gone.
    #[error("Connection closed")]
    Closed,
}

/// Listing and invoking remote tools.
///
/// Implementations must support interleaved calls from many tasks.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Fetch the full tool listing.
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, RemoteError>;

    /// Invoke one tool.
    async fn call_tool(&self, name: &str, args: ToolArgs) -> Result<ToolOutput, RemoteError>;
}

/// A live link to the remote process: a process transport with a protocol
/// session opened on top of it.
#[async_trait]
pub trait RemoteLink: Send + Sync {
    /// Perform the protocol handshake.
    async fn initialize(&self) -> Result<(), RemoteError>;

    /// Handle for listing and calling tools over this link.
    fn tools(&self) -> Arc<dyn ToolTransport>;

    /// Close the protocol session. Safe to call when already closed.
    async fn close_session(&self) -> Result<(), RemoteError>;

    /// Close the process transport. Safe to call when already closed.
    async fn close_transport(&self) -> Result<(), RemoteError>;
}

/// Opens links to the remote process.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Open the transport and the protocol session on top of it.
    ///
    /// If the session cannot be opened, the transport must already be closed
    /// when this returns.
    async fn connect(&self) -> Result<Box<dyn RemoteLink>, RemoteError>;
}

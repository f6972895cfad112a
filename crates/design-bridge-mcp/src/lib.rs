//! MCP stdio client for the remote design-tool server.
//!
//! Provides:
//! - Command building and executable resolution
//! - Child process management with piped stdio
//! - JSON-RPC peer and MCP client
//! - `McpConnector` implementing `RemoteConnector`

pub mod command;
pub mod connector;
pub mod mcp;
pub mod process;

pub use command::{CommandBuildError, CommandBuilder, CommandParts};
pub use connector::{McpConnector, McpLink, McpServerConfig};
pub use mcp::{McpClient, ProtocolPeer};
pub use process::StdioProcess;

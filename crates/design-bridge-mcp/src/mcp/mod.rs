//! MCP client protocol over JSON-RPC 2.0.

pub mod client;
pub mod protocol;
pub mod types;

pub use client::McpClient;
pub use protocol::{ProtocolError, ProtocolPeer};
pub use types::InitializeResult;

//! Core abstractions for the design-tool bridge.
//!
//! This crate provides the fundamental building blocks:
//! - `ToolSpec` / `ToolOutput` - What the remote server advertises and returns
//! - `InvocationResult` - Structured success/error outcome of a tool call
//! - `ToolTransport`, `RemoteLink`, `RemoteConnector` - Seams to the remote process

pub mod result;
pub mod tool;
pub mod traits;

pub use result::InvocationResult;
pub use tool::{ToolOutput, ToolSpec};
pub use traits::{RemoteConnector, RemoteError, RemoteLink, ToolArgs, ToolTransport};

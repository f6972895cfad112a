//! Tool registry, invoker, agent loop and session lifecycle.
//!
//! Provides:
//! - `ToolRegistry` - Name → remote tool lookup
//! - `ToolInvoker` - Structured tool invocation with root frame tracking
//! - `ToolAgent` - Tool-calling loop over a `ChatModel`
//! - `AgentSession` - Start/stop of the remote link and everything bound to it

pub mod agent;
pub mod error;
pub mod frame_id;
pub mod invoker;
pub mod lifecycle;
pub mod registry;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{AgentConfig, AgentReply, ToolAgent, TranscriptEntry};
pub use error::{AgentError, InvokeError, SessionError, TeardownStep, TeardownWarning};
pub use invoker::{CREATE_FRAME_TOOL, ToolInvoker};
pub use lifecycle::{AgentSession, LiveSession, Phase};
pub use registry::{ToolDescriptor, ToolRegistry};
pub use state::SessionState;

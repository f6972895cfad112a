//! Session, invocation and agent errors.

use std::fmt;

use design_bridge_core::RemoteError;
use design_bridge_llm::LlmError;

/// Failure of a single tool invocation. Always reported as an error result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    #[error("Tool '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
}

/// Lifecycle error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The remote could not be reached, rejected the handshake or offered no
    /// tools. Not retried.
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Session already running")]
    AlreadyRunning,
    #[error("Session not running")]
    NotRunning,
}

/// Which close step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    Session,
    Transport,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("protocol session"),
            Self::Transport => f.write_str("process transport"),
        }
    }
}

/// A close step that failed during teardown. Never blocks reaching `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to close {step}: {error}")]
pub struct TeardownWarning {
    pub step: TeardownStep,
    pub error: RemoteError,
}

/// Agent turn error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("Model error: {0}")]
    Model(#[from] LlmError),
    #[error("Agent stopped after {0} steps without a final answer")]
    IterationLimit(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_message_is_kept_verbatim() {
        let err = InvokeError::from(RemoteError::Rejected("Node 9:9 not found".into()));
        assert_eq!(err.to_string(), "Node 9:9 not found");
    }

    #[test]
    fn teardown_warning_names_the_step() {
        let warning = TeardownWarning {
            step: TeardownStep::Transport,
            error: RemoteError::Closed,
        };
        assert_eq!(
            warning.to_string(),
            "Failed to close process transport: Connection closed"
        );
    }
}

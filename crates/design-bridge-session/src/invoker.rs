//! Tool invocation with result normalization and root frame tracking.

use std::sync::Arc;

use design_bridge_core::{InvocationResult, ToolArgs, ToolOutput};
use tracing::{debug, info, instrument, warn};

use crate::{error::InvokeError, frame_id::extract_node_id, registry::ToolRegistry, state::SessionState};

/// The tool whose textual result names a new root frame.
pub const CREATE_FRAME_TOOL: &str = "create_frame";

/// Executes registry tools and turns every outcome into an `InvocationResult`.
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    state: Arc<SessionState>,
}

impl ToolInvoker {
    #[must_use]
    pub const fn new(registry: Arc<ToolRegistry>, state: Arc<SessionState>) -> Self {
        Self { registry, state }
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Invoke `name` with `args`.
    ///
    /// Never fails: unknown tools and remote failures become
    /// `InvocationResult::Error`. Every call reaches the remote; nothing is
    /// cached.
    #[instrument(skip(self, args), fields(tool = %name))]
    pub async fn invoke(&self, name: &str, args: ToolArgs) -> InvocationResult {
        match self.call(name, args).await {
            Ok(data) => {
                if name == CREATE_FRAME_TOOL {
                    self.track_root_frame(&data);
                }
                let root_frame_id = data.as_text().and_then(|_| self.state.get_root_id());
                InvocationResult::Success {
                    data,
                    root_frame_id,
                }
            }
            Err(e) => {
                warn!(error = %e, "Tool invocation failed");
                InvocationResult::error(e.to_string())
            }
        }
    }

    async fn call(&self, name: &str, args: ToolArgs) -> Result<ToolOutput, InvokeError> {
        let tool = self.registry.lookup(name)?;
        debug!(arg_count = args.len(), "Calling remote tool");
        Ok(tool.call(args).await?)
    }

    fn track_root_frame(&self, data: &ToolOutput) {
        let Some(id) = data.as_text().and_then(extract_node_id) else {
            debug!("Frame creation result carried no node id");
            return;
        };
        if self.state.set_root_id_if_absent(id.to_string()) {
            info!(root_frame_id = %id, "Recorded root frame");
        } else {
            debug!(frame_id = %id, "Root frame already recorded, keeping it");
        }
    }
}

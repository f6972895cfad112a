//! Command line and environment configuration.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;
use design_bridge_llm::OpenAiConfig;
use design_bridge_mcp::{CommandBuilder, McpServerConfig};
use design_bridge_session::AgentConfig;

/// Design-tool chat agent over HTTP.
#[derive(Clone, Parser)]
#[command(name = "design-bridge", version, about)]
pub struct Config {
    /// Address to bind.
    #[arg(long, env = "DESIGN_BRIDGE_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "DESIGN_BRIDGE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Command line launching the MCP design-tool server.
    #[arg(
        long,
        env = "DESIGN_BRIDGE_MCP_COMMAND",
        default_value = "node talk_to_figma_mcp/dist/server.js"
    )]
    pub mcp_command: String,

    /// Working directory for the MCP server.
    #[arg(long, env = "DESIGN_BRIDGE_MCP_DIR")]
    pub mcp_dir: Option<PathBuf>,

    /// Deadline for each MCP request, in seconds.
    #[arg(long, env = "DESIGN_BRIDGE_MCP_TIMEOUT_SECS", default_value_t = 60)]
    pub mcp_timeout_secs: u64,

    /// Chat model name.
    #[arg(long, env = "DESIGN_BRIDGE_MODEL", default_value = OpenAiConfig::DEFAULT_MODEL)]
    pub model: String,

    /// OpenAI-compatible API base URL.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = OpenAiConfig::DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// API key for the chat model.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Model round trips allowed per chat turn.
    #[arg(long, env = "DESIGN_BRIDGE_MAX_ITERATIONS", default_value_t = 25)]
    pub max_iterations: usize,

    /// System prompt prepended to every chat turn.
    #[arg(long, env = "DESIGN_BRIDGE_SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,
}

impl Config {
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    #[must_use]
    pub fn mcp_server(&self) -> McpServerConfig {
        let mut server = McpServerConfig::new(CommandBuilder::new(self.mcp_command.clone()));
        server.working_dir.clone_from(&self.mcp_dir);
        server.request_timeout = Duration::from_secs(self.mcp_timeout_secs);
        server
    }

    #[must_use]
    pub fn llm(&self) -> OpenAiConfig {
        OpenAiConfig::new(self.api_key.clone())
            .with_model(self.model.clone())
            .with_base_url(self.api_base_url.clone())
    }

    #[must_use]
    pub fn agent(&self) -> AgentConfig {
        AgentConfig {
            max_iterations: self.max_iterations,
            system_prompt: self.system_prompt.clone(),
        }
    }
}

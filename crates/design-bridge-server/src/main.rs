//! design-bridge: chat agent for a design tool, served over HTTP.
//!
//! Launches the MCP design-tool server, binds its tools to the chat model and
//! serves the HTTP API until Ctrl-C or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use design_bridge_llm::OpenAiClient;
use design_bridge_mcp::McpConnector;
use design_bridge_server::{AppState, Config, router};
use design_bridge_session::AgentSession;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::parse();

    let model = OpenAiClient::new(config.llm()).context("Failed to build chat client")?;
    let connector = McpConnector::new(config.mcp_server());
    let session = Arc::new(AgentSession::new(
        Arc::new(connector),
        Arc::new(model),
        config.agent(),
    ));

    session
        .start()
        .await
        .context("Failed to start agent session")?;

    let app = router(AppState::new(Arc::clone(&session)));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server listening on http://{addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    match session.stop().await {
        Ok(warnings) if !warnings.is_empty() => {
            warn!(count = warnings.len(), "Agent session stopped with warnings");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Agent session was not running at shutdown"),
    }

    served.context("Server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown signal received");
}

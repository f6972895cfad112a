//! HTTP API for the design-bridge agent.
//!
//! Provides:
//! - `router` - axum routes for chat, image chat, tools and session control
//! - `Config` - command line and environment settings

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use design_bridge_session::AgentSession;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod handlers;
pub mod params;
pub mod protocol;

pub use config::Config;

/// Largest accepted image chat upload.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<AgentSession>,
}

impl AppState {
    #[must_use]
    pub const fn new(session: Arc<AgentSession>) -> Self {
        Self { session }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handlers::chat))
        .route(
            "/chat-img",
            post(handlers::chat_img).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/tool/create_text_in_root_frame",
            post(handlers::create_text_in_root_frame),
        )
        .route("/tool/{tool_name}", post(handlers::invoke_tool))
        .route("/tools", get(handlers::list_tools))
        .route("/health", get(handlers::health))
        .route("/session/restart", post(handlers::restart_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

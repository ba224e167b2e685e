//! HTTP server
//!
//! Serves the MP4 endpoints over axum. Handlers look streams up in the
//! shared [`StreamRegistry`] and hand each request to the consumer
//! lifecycle in [`crate::consumer`].

pub mod config;
pub mod error;
pub mod listener;
pub mod routes;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::registry::StreamRegistry;

pub use config::ServerConfig;
pub use error::ApiError;
pub use listener::RelayServer;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<StreamRegistry>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(registry: Arc<StreamRegistry>, config: ServerConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/stream.mp4", get(routes::stream_mp4))
        .route("/api/frame.mp4", get(routes::frame_mp4))
        .with_state(state)
}

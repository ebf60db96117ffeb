//! HTTP proxy endpoints
//!
//! Serves `POST /api/chat` and `POST /api/transcribe`, forwarding to a hosted
//! [`ModelProvider`] so that provider credentials never reach the client.

pub mod error;
pub mod handlers;
pub mod upstream;

use crate::llm::{build_system_prompt, UpstreamConfig};
use crate::{ParleyError, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiError;
pub use upstream::{ModelProvider, OpenAiCompatProvider};

/// Configuration for the proxy server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: String,

    /// Largest accepted request body (audio uploads), in bytes
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            max_body_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn ModelProvider>,
    pub chat_prompt: String,
    pub voice_prompt: String,
}

impl AppState {
    /// State with prompts naming the configured models
    pub fn new(provider: Arc<dyn ModelProvider>, upstream: &UpstreamConfig) -> Self {
        Self {
            provider,
            chat_prompt: build_system_prompt(&upstream.chat_model, None, None),
            voice_prompt: build_system_prompt(
                &upstream.chat_model,
                Some(&upstream.transcription_model),
                None,
            ),
        }
    }
}

/// Build the proxy router with CORS and request tracing
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/transcribe", post(handlers::transcribe))
        .route("/api/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .map_err(|e| ParleyError::Config(format!("Failed to bind {}: {}", config.bind, e)))?;

    info!("Proxy listening on http://{}", config.bind);

    axum::serve(listener, build_router(state, config))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    Ok(())
}

//! HTTP service
//!
//! ```text
//! GET  /         -> {"ok": true, "service": "packshot"}
//! GET  /health   -> {"status": "ok"}
//! POST /process  -> multipart file (+ size, pad, format, quality) -> image bytes
//! ```
//!
//! The remover session is built before the listener accepts connections;
//! pipeline work runs on the blocking pool.

pub mod error;
pub mod handler;

use crate::config::PipelineConfig;
use crate::session::RemoverSession;
use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use error::ApiError;
pub use handler::API_KEY_HEADER;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
/// Uploads larger than this are rejected before decoding
pub const DEFAULT_BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Listener and request defaults of the service
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Required `X-API-Key` value; `None` disables the check
    pub api_key: Option<String>,
    /// Defaults applied before per-request overrides
    pub base_config: PipelineConfig,
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            api_key: None,
            base_config: PipelineConfig::default(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Treat an empty or whitespace key as "no key"
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        self
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub session: Arc<RemoverSession>,
    pub base_config: Arc<PipelineConfig>,
    pub api_key: Option<String>,
    pub service_name: &'static str,
}

impl AppState {
    #[must_use]
    pub fn new(config: &ServerConfig, session: Arc<RemoverSession>) -> Self {
        Self {
            session,
            base_config: Arc::new(config.base_config.clone()),
            api_key: config.api_key.clone(),
            service_name: env!("CARGO_PKG_NAME"),
        }
    }
}

/// Build the application router
pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(handler::root))
        .route("/health", get(handler::health))
        .route("/process", post(handler::process))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Initialize the remover, bind and serve until Ctrl-C
///
/// # Errors
/// - the base configuration is invalid
/// - the remover session cannot be built
/// - the address cannot be bound
pub async fn serve(config: ServerConfig, session: Arc<RemoverSession>) -> anyhow::Result<()> {
    config
        .base_config
        .validate()
        .context("Invalid default pipeline configuration")?;

    let remover = session
        .get()
        .await
        .context("Failed to initialize background remover")?;
    tracing::info!(remover = remover.name(), "Remover session warmed up");

    let app = router(AppState::new(&config, session), config.body_limit);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(
        address = %addr,
        api_key = config.api_key.is_some(),
        "Packshot service listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Packshot service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

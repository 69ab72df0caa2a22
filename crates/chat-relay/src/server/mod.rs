//! HTTP server for the chat relay
//!
//! Exposes:
//! - `POST /api/chat` streaming chat completions
//! - `GET /health` liveness probe

pub mod handlers;

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::augment::ContextAugmenter;
use crate::config::{Config, ServerConfig};
use crate::error::{RelayError, Result};
use crate::quota::{HttpQuotaGate, QuotaGate, UnmeteredQuotaGate};
use crate::relay::{CompletionProvider, OpenAiProvider};

/// Shared application state for all handlers
///
/// Built once at startup and never mutated; nothing in here belongs to a
/// single request.
#[derive(Clone)]
pub struct AppState {
    /// Relay configuration
    pub config: Config,
    /// Usage accounting check
    pub quota: Arc<dyn QuotaGate>,
    /// Retrieval collaborators
    pub augmenter: ContextAugmenter,
    /// Streaming LLM backend
    pub provider: Arc<dyn CompletionProvider>,
}

impl AppState {
    /// Wire up the production collaborators described by `config`
    pub fn from_config(config: Config) -> Result<Self> {
        let client = build_http_client(&config.server)?;

        let quota: Arc<dyn QuotaGate> = match &config.collaborators.quota_url {
            Some(url) => Arc::new(HttpQuotaGate::new(client.clone(), url.clone())),
            None => Arc::new(UnmeteredQuotaGate),
        };
        let augmenter = ContextAugmenter::new(client.clone(), &config.collaborators)?;
        let provider = Arc::new(OpenAiProvider::new(client, &config.provider)?);

        Ok(Self {
            config,
            quota,
            augmenter,
            provider,
        })
    }
}

/// Shared outbound HTTP client.
///
/// `timeout_secs` bounds connecting and each idle gap between reads, never
/// the whole response, so long completions keep streaming.
pub fn build_http_client(config: &ServerConfig) -> Result<reqwest::Client> {
    let timeout = Duration::from_secs(config.timeout_secs);

    reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .map_err(|e| RelayError::Server(format!("Failed to create HTTP client: {e}")))
}

/// The relay server
pub struct RelayServer {
    state: Arc<AppState>,
}

impl RelayServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Start the server and listen for requests until shutdown
    pub async fn serve(&self) -> Result<()> {
        let config = &self.state.config;
        let addr: SocketAddr = config
            .server
            .listen_addr
            .parse()
            .map_err(|e| RelayError::Config(format!("Invalid listen address: {e}")))?;

        tracing::info!("Quota gate: {}", self.state.quota.name());
        tracing::info!("Completion provider: {}", self.state.provider.name());
        tracing::info!(
            "Default model: {}, fallback model: {}",
            config.provider.default_model,
            config.provider.fallback_model
        );

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Server(format!("Failed to bind to {addr}: {e}")))?;
        tracing::info!("Listening on {addr}");

        axum::serve(listener, create_router(self.state.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RelayError::Server(format!("Server error: {e}")))?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/chat", post(handlers::chat_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

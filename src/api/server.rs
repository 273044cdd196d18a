//! Unitforge API Server implementation
//!
//! HTTP REST API server using Axum. Serves lookups, formula algebra and
//! scoring directly, and runs the acquisition loop for `ask`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::handlers;
use crate::cli::build_agent;
use crate::config::KbConfig;
use crate::core::Agent;

/// API Server configuration
#[derive(Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub agent: Agent,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            agent,
        }
    }
}

/// All routes, without binding a listener
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        // Core API endpoints
        .route("/api/v1/ask", post(handlers::ask))
        .route("/api/v1/lookup", post(handlers::lookup))
        .route("/api/v1/evaluate", post(handlers::evaluate))
        .route("/api/v1/invert", post(handlers::invert))
        .route("/api/v1/score", post(handlers::score))
        .route("/api/v1/ingest", post(handlers::ingest))
        // State and middleware
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the API server
pub async fn run_api_server(config: ApiConfig, kb: KbConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unitforge=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let (agent, _) = build_agent(&kb)?;
    let state = Arc::new(AppState::new(agent));
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("🔥 Unitforge API Server starting on http://{}", addr);
    info!(
        store = %kb.store.path.display(),
        oracle = ?kb.oracle.backend,
        "Knowledge base ready"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Unitforge API Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_config_address_format() {
        let config = ApiConfig {
            host: "192.168.1.100".to_string(),
            port: 9090,
        };
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .unwrap();
        assert_eq!(addr.port(), 9090);
    }
}

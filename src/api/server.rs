//! API Server
//!
//! Listener setup, middleware stack and graceful shutdown.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::{
    config::ServerConfig,
    errors::{CasinoResult, ConfigurationError},
};
use axum::Router;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

/// Router with the full middleware stack applied
pub fn create_app(state: Arc<AppState>, config: &ServerConfig) -> Router {
    // Outermost first: tracing sees the whole request, the request id is
    // attached right before routing
    create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(create_cors_layer(config.allowed_origins.clone()))
            .layer(axum::middleware::from_fn(request_id_middleware)),
    )
}

pub struct ApiServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> CasinoResult<()> {
        let addr = self.socket_addr()?;
        let app = create_app(self.state.clone(), &self.config);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Mines API listening on http://{}", addr);
        self.log_server_info();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped");
        Ok(())
    }

    fn socket_addr(&self) -> CasinoResult<SocketAddr> {
        let ip = self
            .config
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| ConfigurationError::InvalidValue {
                field: "server.host".to_string(),
                value: self.config.host.clone(),
                reason: e.to_string(),
            })?;
        Ok(SocketAddr::from((ip, self.config.port)))
    }

    fn log_server_info(&self) {
        info!("   Version: {}", self.state.version);
        info!("   CORS: {:?}", self.config.allowed_origins);
        info!("   Request timeout: {}s", self.config.request_timeout_secs);
        info!("Available endpoints:");
        info!("   GET  /health");
        info!("   GET  /metrics");
        info!("   GET  /api/me");
        info!("   POST /api/topup");
        info!("   GET  /api/mines/odds?bet=&mines=");
        info!("   GET  /api/mines/rounds");
        info!("   POST /api/mines/rounds");
        info!("   GET  /api/mines/rounds/:round_id");
        info!("   POST /api/mines/rounds/:round_id/reveal");
        info!("   POST /api/mines/rounds/:round_id/cashout");
        info!("   GET  /api/mines/history?limit=");
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}

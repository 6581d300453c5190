//! API Server
//!
//! Middleware stack, listener and graceful shutdown.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::{config::RaspadinhaConfig, Platform};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Environment variable holding the admin key
pub const ADMIN_KEY_ENV: &str = "RASPADINHA_ADMIN_KEY";

pub struct ApiServer {
    config: RaspadinhaConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: RaspadinhaConfig, platform: Platform, admin_key: Option<String>) -> Self {
        let state = Arc::new(AppState {
            platform,
            admin_key,
            metrics_enabled: config.monitoring.enable_metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
        });
        Self { config, state }
    }

    /// Admin key from [`ADMIN_KEY_ENV`], ignoring an empty value
    pub fn admin_key_from_env() -> Option<String> {
        std::env::var(ADMIN_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.socket_addr()?;
        let app = build_app(self.state.clone(), &self.config);

        if self.state.admin_key.is_none() {
            warn!("{} is not set, admin routes are unprotected", ADMIN_KEY_ENV);
        }
        info!(
            %addr,
            cors = ?self.config.api.allowed_origins,
            request_timeout_secs = self.config.api.request_timeout_secs,
            lock_timeout_ms = self.config.settlement.lock_timeout_ms,
            metrics = self.config.monitoring.enable_metrics,
            "Starting raspadinha API server"
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped gracefully");
        Ok(())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.api.host.parse::<std::net::IpAddr>()?,
            self.config.api.port,
        )))
    }
}

/// Router with the full middleware stack
pub fn build_app(state: Arc<AppState>, config: &RaspadinhaConfig) -> axum::Router {
    create_router(state)
        // Request ID middleware (first for tracing)
        .layer(axum::middleware::from_fn(request_id_middleware))
        // CORS layer (before timeout to handle preflight)
        .layer(create_cors_layer(config.api.allowed_origins.clone()))
        .layer(TimeoutLayer::new(config.request_timeout()))
        // Tracing layer (last for complete request tracing)
        .layer(TraceLayer::new_for_http())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}

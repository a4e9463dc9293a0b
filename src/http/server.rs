//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (observability, request timeout)
//! - Serve on a bound listener
//! - Drain in-flight requests on shutdown, bounded by a grace period

use std::net::SocketAddr;
use std::time::Duration;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tower_http::timeout::TimeoutLayer;

use crate::config::ServerConfig;
use crate::http::handlers;
use crate::http::middleware::ObserveLayer;
use crate::observability::logging::{self, LogContext};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub metrics: PrometheusHandle,
    pub max_delay_ms: u64,
}

/// HTTP server.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    metrics: PrometheusHandle,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        let state = AppState {
            metrics: metrics.clone(),
            max_delay_ms: config.hello_max_delay_ms,
        };

        let router = Self::build_router(&config, state);
        Self { router, config, metrics }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .route("/", get(handlers::index))
            .route("/healthz", get(handlers::healthz))
            .route("/hello", get(handlers::hello))
            .route("/metrics", get(handlers::metrics))
            .fallback(handlers::index)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(ObserveLayer::new(&config.version, LogContext::background()))
    }

    /// Run the server until `shutdown` fires, then drain for at most the
    /// configured grace period.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let logger = logging::bg();
        tracing::info!(
            address = %addr,
            version = %self.config.version,
            "HTTP server starting"
        );

        let upkeep = spawn_metrics_upkeep(self.metrics.clone());

        let (draining_tx, draining_rx) = oneshot::channel::<()>();
        let shutdown_logger = logger.clone();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            shutdown_logger.info("Shutting down server...");
            let _ = draining_tx.send(());
        });
        let mut server = tokio::spawn(async move { serve.await });

        let result = tokio::select! {
            joined = &mut server => joined.map_err(std::io::Error::other).and_then(|r| r),
            _ = draining_rx => {
                let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
                match tokio::time::timeout(grace, &mut server).await {
                    Ok(joined) => joined.map_err(std::io::Error::other).and_then(|r| r),
                    Err(_) => {
                        server.abort();
                        logger.error(format!("Connections still open after {:?}, aborting", grace));
                        Ok(())
                    }
                }
            }
        };

        upkeep.abort();
        match &result {
            Ok(()) => logger.info("Success shutdown server."),
            Err(e) => logger.error(format!("HTTP server failed: {}", e)),
        }
        result
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn spawn_metrics_upkeep(handle: PrometheusHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            handle.run_upkeep();
        }
    })
}

//! httpserver
//!
//! A small HTTP server built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ ┌──────────────────────┐    ┌──────────────┐
//!                     │ observe middleware   │───▶│   handlers   │
//!     Client Response │ header echo, client  │    │ / /healthz   │
//!     ◀────────────── │ IP, summary record   │◀───│ /hello       │
//!                     └──────────┬───────────┘    │ /metrics     │
//!                                │                └──────────────┘
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │ logging facade       │──▶ stdout
//!                     │ (service-name tag)   │──▶ <dir>/<svc>.<YYYYMMDDHH>.log
//!                     └──────────────────────┘
//! ```

use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;

use httpserver::config::ServerConfig;
use httpserver::http::HttpServer;
use httpserver::lifecycle::{signals, BuildInfo, Shutdown};
use httpserver::observability::{logging, metrics};

#[tokio::main]
async fn main() -> ExitCode {
    let config = ServerConfig::parse();
    if config.show_version {
        println!("{}", BuildInfo::current(&config.version));
        return ExitCode::SUCCESS;
    }

    // Nothing can be observed without a logger, so failing here is fatal.
    if let Err(e) = logging::init(&config.logging()) {
        logging::bg().error(format!("Failed to initialize logger: {}", e));
        return ExitCode::FAILURE;
    }

    let code = match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logging::bg().error(e.to_string());
            ExitCode::FAILURE
        }
    };
    logging::shutdown();
    code
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let logger = logging::bg();
    let metrics = metrics::install()?;

    let listener = TcpListener::bind(config.bind_address()).await?;
    logger.info(format!(
        "starting http[{}] server..., version:[{}]",
        listener.local_addr()?,
        config.version
    ));

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, metrics);
    let mut serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        joined = &mut serving => return Ok(joined??),
        signal = signals::wait_for_signal() => {
            let signal = signal?;
            tracing::info!(signal = ?signal, "Shutdown signal received");
        }
    }

    shutdown.trigger();
    serving.await??;
    Ok(())
}

//! HTTP server with request logging, graceful shutdown, health and metrics
//! endpoints.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use httpserver::config::ServerConfig;
use httpserver::http::HttpServer;
use httpserver::lifecycle::Shutdown;
use httpserver::observability::metrics;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A server running on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Config tuned for fast tests.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig {
        listen_address: "127.0.0.1:0".to_string(),
        version: "9.9.9-test".to_string(),
        hello_max_delay_ms: 20,
        ..Default::default()
    };
    config.timeouts.shutdown_grace_secs = 1;
    config
}

/// Bind and start a server with `config`.
pub async fn start_server(config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind(config.bind_address()).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, metrics::install().unwrap());
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    // Let the accept loop start.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer { addr, shutdown, handle }
}

/// A client that never pools connections, so shutdown is not held up.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

//! Configuration schema definitions.
//!
//! Every option is a command-line flag with an environment fallback. Flag
//! names keep their dotted form (`--web.listen-address`) so existing
//! deployment scripts keep working.

use std::path::PathBuf;

use clap::Parser;

use crate::observability::logging::{self, DEFAULT_LOG_DIR};

/// Service name used when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "httpserver";

/// Root configuration for the server.
#[derive(Debug, Clone, Parser)]
#[command(name = "httpserver", about = "HTTP server with request logging, health and metrics endpoints")]
pub struct ServerConfig {
    /// Address to listen on for web interface and telemetry.
    #[arg(long = "web.listen-address", env = "WEB_LISTEN_ADDRESS", default_value = ":8080")]
    pub listen_address: String,

    /// Service name.
    #[arg(long = "web.serviceName", env = "WEB_SERVICE_NAME", default_value = DEFAULT_SERVICE_NAME)]
    pub service_name: String,

    /// Project version, echoed in the `version` response header.
    #[arg(long = "version", env = "VERSION", default_value = "1.0.0")]
    pub version: String,

    /// Show version and exit.
    #[arg(long = "v", env = "V")]
    pub show_version: bool,

    /// Sets the loglevel. Valid levels are debug, info, warn, error, dpanic, panic, fatal.
    #[arg(long = "log.level", env = "LOG_LEVEL", default_value = "debug")]
    pub log_level: String,

    /// Directory for rotated log files.
    #[arg(long = "log.dir", env = "LOG_DIR", default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    #[command(flatten)]
    pub timeouts: TimeoutConfig,

    /// Upper bound of the random delay added by `/hello`, in milliseconds.
    #[arg(long = "hello.max-delay-ms", env = "HELLO_MAX_DELAY_MS", default_value_t = 2000)]
    pub hello_max_delay_ms: u64,
}

impl ServerConfig {
    /// Bind address with Go-style `:port` expanded to all interfaces.
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }

    /// The subset of settings the logger needs.
    pub fn logging(&self) -> logging::Config {
        logging::Config {
            service_name: self.service_name.clone(),
            log_level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: ":8080".to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            version: "1.0.0".to_string(),
            show_version: false,
            log_level: "debug".to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            timeouts: TimeoutConfig::default(),
            hello_max_delay_ms: 2000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, clap::Args)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    #[arg(long = "web.timeout-secs", env = "WEB_TIMEOUT_SECS", default_value_t = 120)]
    pub request_secs: u64,

    /// How long in-flight requests may drain after shutdown starts, in seconds.
    #[arg(long = "web.shutdown-grace-secs", env = "WEB_SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 120,
            shutdown_grace_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli() {
        let parsed = ServerConfig::try_parse_from(["httpserver"]).unwrap();
        let default = ServerConfig::default();

        assert_eq!(parsed.listen_address, default.listen_address);
        assert_eq!(parsed.service_name, default.service_name);
        assert_eq!(parsed.version, default.version);
        assert_eq!(parsed.log_level, default.log_level);
        assert_eq!(parsed.log_dir, default.log_dir);
        assert_eq!(parsed.timeouts.request_secs, default.timeouts.request_secs);
        assert_eq!(parsed.timeouts.shutdown_grace_secs, default.timeouts.shutdown_grace_secs);
        assert_eq!(parsed.hello_max_delay_ms, default.hello_max_delay_ms);
        assert!(!parsed.show_version);
    }

    #[test]
    fn test_dotted_flags() {
        let parsed = ServerConfig::try_parse_from([
            "httpserver",
            "--web.listen-address",
            "127.0.0.1:9000",
            "--web.serviceName",
            "orders",
            "--version",
            "2.1.0",
            "--log.level",
            "warn",
            "--v",
        ])
        .unwrap();

        assert_eq!(parsed.listen_address, "127.0.0.1:9000");
        assert_eq!(parsed.service_name, "orders");
        assert_eq!(parsed.version, "2.1.0");
        assert_eq!(parsed.log_level, "warn");
        assert!(parsed.show_version);
    }

    #[test]
    fn test_bind_address() {
        let mut config = ServerConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");

        config.listen_address = "127.0.0.1:3000".to_string();
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_logging_subset() {
        let config = ServerConfig {
            service_name: "orders".into(),
            log_level: "error".into(),
            ..Default::default()
        };
        let logging = config.logging();
        assert_eq!(logging.service_name, "orders");
        assert_eq!(logging.log_level, "error");
    }
}

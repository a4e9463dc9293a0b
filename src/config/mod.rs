//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command line flags / environment
//!     → schema.rs (clap parse, defaults)
//!     → ServerConfig (immutable)
//!     → logging::Config for the logger, the rest for the HTTP server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once parsed
//! - All fields have defaults so the server runs with no flags at all
//! - Log retention is read from `LOG_ROTATE_DAYS` by the logger itself, since
//!   the logger starts before anything else

pub mod schema;

pub use schema::{ServerConfig, TimeoutConfig, DEFAULT_SERVICE_NAME};

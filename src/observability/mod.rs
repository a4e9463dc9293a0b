//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Any code path:
//!     → logging.rs (process-wide facade, service-name tagging)
//!         → stdout
//!         → rotation.rs (rotating file, retention pruning)
//!
//! Handlers:
//!     → metrics.rs (execution latency histogram)
//!
//! Consumers:
//!     → Log shipping reads <log_dir>/<service>.<YYYYMMDDHH>.log
//!     → Prometheus scrapes /metrics
//! ```
//!
//! # Design Decisions
//! - Logging works before initialization; nothing has to be wired by hand
//! - Initialization happens once; later calls are no-ops
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod rotation;

pub use logging::{Field, LogContext, Logger};

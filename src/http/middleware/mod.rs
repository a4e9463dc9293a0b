//! Request middleware.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → observe.rs (echo headers, resolve client IP, start clock)
//!     → inner router
//!     → observe.rs (count body bytes, emit summary at end of stream)
//! ```

pub mod client_ip;
pub mod observe;

pub use client_ip::resolve_client_ip;
pub use observe::{Observe, ObserveLayer, RequestObservation, VERSION_HEADER};

//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Install the Prometheus recorder once per process
//! - Time handler execution
//! - Render the text exposition for `/metrics`
//!
//! # Metrics
//! - `httpserver_execution_latency_seconds` (histogram): handler latency by step
//!
//! # Design Decisions
//! - Exponential buckets starting at 1ms, doubling, 15 buckets
//! - Recorder is global; later installs hand back the existing handle

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const EXECUTION_LATENCY: &str = "httpserver_execution_latency_seconds";

static HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

fn latency_buckets() -> Vec<f64> {
    (0..15).map(|i| 0.001 * f64::from(1u32 << i)).collect()
}

/// Install the Prometheus recorder and return a handle for rendering.
pub fn install() -> Result<PrometheusHandle, BuildError> {
    let mut installed = HANDLE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = installed.as_ref() {
        return Ok(handle.clone());
    }

    let recorder = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(EXECUTION_LATENCY.to_string()), &latency_buckets())?
        .build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Another metrics recorder is already installed");
    }

    metrics::describe_histogram!(
        EXECUTION_LATENCY,
        metrics::Unit::Seconds,
        "Time spent executing request handlers"
    );

    *installed = Some(handle.clone());
    Ok(handle)
}

/// Measures one handler execution.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    /// Record the elapsed time under `step="total"`.
    pub fn observe_total(&self) {
        self.observe("total");
    }

    pub fn observe(&self, step: &'static str) {
        metrics::histogram!(EXECUTION_LATENCY, "step" => step).record(self.start.elapsed().as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let buckets = latency_buckets();
        assert_eq!(buckets.len(), 15);
        assert_eq!(buckets[0], 0.001);
        assert_eq!(buckets[14], 0.001 * 16384.0);
    }

    #[test]
    fn test_install_renders_timer() {
        install().unwrap();
        let handle = install().unwrap();

        Timer::new().observe_total();

        let rendered = handle.render();
        assert!(rendered.contains(EXECUTION_LATENCY), "{rendered}");
        assert!(rendered.contains(r#"step="total""#), "{rendered}");
    }
}

//! Prometheus metrics for timed backend operations.
//!
//! Metrics are registered lazily on first access using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};
use prometheus::{Encoder, TextEncoder};

use crate::error::{CoreError, CoreResult};
use crate::event::{EventSink, RequestEvent};

/// Total number of timed operations by backend, operation and status
pub static REQUEST_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "simload_requests_total",
        "Total number of timed backend operations",
        &["request_type", "name", "status"]
    )
    .expect("Failed to register request counter")
});

/// Timed operation duration histogram
pub static REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "simload_request_duration_seconds",
        "Timed backend operation duration in seconds",
        &["request_type", "name"],
        // Buckets: 5ms .. 30s
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register request duration histogram")
});

/// Records every event into the process-wide Prometheus registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusSink;

impl PrometheusSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for PrometheusSink {
    fn emit(&self, event: RequestEvent) {
        let status = if event.is_failure() { "failure" } else { "success" };
        REQUEST_COUNT
            .with_label_values(&[&event.request_type, &event.name, status])
            .inc();
        REQUEST_DURATION
            .with_label_values(&[&event.request_type, &event.name])
            .observe(event.response_time_ms / 1000.0);
    }
}

/// Renders the default registry in the Prometheus text format.
pub fn render_metrics() -> CoreResult<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| CoreError::internal(format!("failed to encode metrics: {e}")))?;
    String::from_utf8(buffer)
        .map_err(|e| CoreError::internal(format!("metrics are not UTF-8: {e}")))
}

//! Prometheus metrics registry
//!
//! Process-wide request counters and latency histogram, exposed through
//! `/metrics` in Prometheus text format.

use axum::http::StatusCode;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Latency buckets in seconds.
const LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0];

/// Shared metrics handle.
///
/// Cheap to clone; the underlying counters are atomic, so concurrent
/// handlers never lose increments.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    request_count: IntCounterVec,
    request_latency: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_count = IntCounterVec::new(
            Opts::new(
                "request_count",
                "Total request count partitioned by HTTP status class",
            ),
            &["status_class", "route"],
        )?;

        let request_latency = Histogram::with_opts(
            HistogramOpts::new("request_latency_seconds", "Request latency in seconds")
                .buckets(LATENCY_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(request_count.clone()))?;
        registry.register(Box::new(request_latency.clone()))?;

        // Touch the well-known cells so the counter family is visible to
        // scrapers before the first request lands.
        request_count.with_label_values(&["2xx", "/health"]);
        request_count.with_label_values(&["2xx", "/predict"]);

        Ok(Self {
            registry: Arc::new(registry),
            request_count,
            request_latency,
        })
    }

    /// Count a finished request and record its latency.
    pub fn observe_request(&self, status: StatusCode, route: &str, elapsed: Duration) {
        self.inc_request(status, route);
        self.request_latency.observe(elapsed.as_secs_f64());
    }

    /// Count a request without a latency sample (the uncaught-panic path).
    pub fn inc_request(&self, status: StatusCode, route: &str) {
        let class = status_class(status);
        self.request_count
            .with_label_values(&[class.as_str(), route])
            .inc();
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }

    /// MIME type of [`Metrics::render`] output.
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Current value of one `(status_class, route)` counter cell.
    #[cfg(test)]
    pub fn request_count_value(&self, status: StatusCode, route: &str) -> u64 {
        let class = status_class(status);
        self.request_count
            .with_label_values(&[class.as_str(), route])
            .get()
    }
}

/// Leading-digit class of an HTTP status code, e.g. 200 -> "2xx".
fn status_class(status: StatusCode) -> String {
    format!("{}xx", status.as_u16() / 100)
}

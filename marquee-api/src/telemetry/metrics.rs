//! Prometheus Metrics Definitions
//!
//! Defines all Marquee metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<MarqueeMetrics>> = Lazy::new(MarqueeMetrics::new);

/// Container for all Marquee metrics.
#[derive(Clone)]
pub struct MarqueeMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Catalog cache lookups - labels: kind, outcome (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// Claim redemption attempts - labels: outcome
    pub claim_redemptions_total: CounterVec,
}

impl MarqueeMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "marquee_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to register http_requests_total: {}", e))
            })?,

            http_request_duration_seconds: register_histogram_vec!(
                "marquee_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| {
                ApiError::internal_error(format!(
                    "Failed to register http_request_duration_seconds: {}",
                    e
                ))
            })?,

            cache_lookups_total: register_counter_vec!(
                "marquee_cache_lookups_total",
                "Catalog page cache lookups",
                &["kind", "outcome"]
            )
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to register cache_lookups_total: {}", e))
            })?,

            claim_redemptions_total: register_counter_vec!(
                "marquee_claim_redemptions_total",
                "Premium claim redemption attempts by outcome",
                &["outcome"]
            )
            .map_err(|e| {
                ApiError::internal_error(format!(
                    "Failed to register claim_redemptions_total: {}",
                    e
                ))
            })?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a catalog cache lookup.
    pub fn record_cache_lookup(&self, kind: &str, hit: bool) {
        let outcome = if hit { "hit" } else { "miss" };
        self.cache_lookups_total
            .with_label_values(&[kind, outcome])
            .inc();
    }

    /// Record the terminal outcome of a claim redemption.
    pub fn record_claim_redemption(&self, outcome: &str) {
        self.claim_redemptions_total
            .with_label_values(&[outcome])
            .inc();
    }
}

/// Run `f` against the global metrics, skipping silently if registration failed.
pub fn with_metrics(f: impl FnOnce(&MarqueeMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
))]
pub async fn metrics_handler() -> impl IntoResponse {
    if let Err(e) = METRICS.as_ref() {
        tracing::error!(error = %e, "Metrics registry unavailable");
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_cache_lookup() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        let before = metrics
            .cache_lookups_total
            .with_label_values(&["series", "hit"])
            .get();
        metrics.record_cache_lookup("series", true);
        let after = metrics
            .cache_lookups_total
            .with_label_values(&["series", "hit"])
            .get();
        assert!(after >= before + 1.0);
        Ok(())
    }

    #[test]
    fn test_record_claim_and_http() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.record_claim_redemption("success");
        metrics.record_http_request("GET", "/catalog/movies", 200, 0.004);
        Ok(())
    }

    #[tokio::test]
    async fn test_metrics_handler_exposes_marquee_families() {
        with_metrics(|m| m.record_claim_redemption("rate_limited"));
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

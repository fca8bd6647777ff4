//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Process-wide Prometheus handle, installed by [`init_metrics`]
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize metrics (call once at startup)
pub fn init_metrics() -> anyhow::Result<()> {
    PROMETHEUS_HANDLE.get_or_try_init(|| PrometheusBuilder::new().install_recorder())?;
    register_metrics();
    Ok(())
}

/// Register all custom metrics
fn register_metrics() {
    metrics::describe_counter!(
        "model_proxy_requests_total",
        "Total number of proxied requests by outcome"
    );
    metrics::describe_histogram!(
        "model_proxy_request_duration_seconds",
        "Time until the response head was ready, in seconds"
    );
    metrics::describe_counter!(
        "model_proxy_admission_rejected_total",
        "Requests shed because an admission pool was full"
    );
    metrics::describe_gauge!(
        "model_proxy_inflight",
        "Admission slots currently held"
    );
}

/// Prometheus metrics endpoint handler
///
/// Returns metrics in Prometheus text format for scraping.
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Record a request
pub fn record_request(outcome: &str, model: &str, duration_secs: f64) {
    metrics::counter!(
        "model_proxy_requests_total",
        "outcome" => outcome.to_string(),
        "model" => model.to_string()
    )
    .increment(1);
    metrics::histogram!("model_proxy_request_duration_seconds", "model" => model.to_string())
        .record(duration_secs);
}

/// Record a request shed by admission control
pub fn record_admission_rejected(pool: &str) {
    metrics::counter!("model_proxy_admission_rejected_total", "pool" => pool.to_string())
        .increment(1);
}

/// Adjust the in-flight gauge of a pool
pub fn record_inflight(pool: &str, delta: f64) {
    metrics::gauge!("model_proxy_inflight", "pool" => pool.to_string()).increment(delta);
}

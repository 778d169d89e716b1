//! Prometheus metrics for reconciliation-service.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, HistogramVec, IntGaugeVec, TextEncoder, register_counter_vec,
    register_histogram_vec, register_int_gauge_vec,
};
use std::time::Instant;

/// Counter for sync cycles by outcome.
pub static SYNC_CYCLES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_sync_cycles_total",
        "Total number of sync cycles",
        &["status", "trigger"]
    )
    .expect("Failed to register SYNC_CYCLES")
});

/// Histogram for sync cycle duration.
pub static SYNC_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reconciliation_sync_duration_seconds",
        "Sync cycle duration in seconds",
        &["status"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to register SYNC_DURATION")
});

/// Counter for verdicts written, by status and method.
pub static VERDICTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_verdicts_total",
        "Total number of reconciliation verdicts written",
        &["status", "method"]
    )
    .expect("Failed to register VERDICTS")
});

/// Counter for failed collaborator calls.
pub static FETCH_FAILURES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_fetch_failures_total",
        "Total number of failed collaborator fetches",
        &["operation", "kind"]
    )
    .expect("Failed to register FETCH_FAILURES")
});

/// Gauge for alerts currently raised.
pub static ACTIVE_ALERTS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "reconciliation_active_alerts",
        "Alerts raised by the latest sync cycle",
        &["severity"]
    )
    .expect("Failed to register ACTIVE_ALERTS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Counter for HTTP requests by route and status.
pub static HTTP_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_http_requests_total",
        "Total number of HTTP requests",
        &["method", "route", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS")
});

/// Histogram for HTTP request duration by route.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reconciliation_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "route"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register HTTP_REQUEST_DURATION")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&SYNC_CYCLES);
    Lazy::force(&SYNC_DURATION);
    Lazy::force(&VERDICTS);
    Lazy::force(&FETCH_FAILURES);
    Lazy::force(&ACTIVE_ALERTS);
    Lazy::force(&ERRORS);
    Lazy::force(&HTTP_REQUESTS);
    Lazy::force(&HTTP_REQUEST_DURATION);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record a finished sync cycle.
pub fn record_sync_cycle(status: &str, silent: bool, duration_secs: f64) {
    let trigger = if silent { "scheduled" } else { "manual" };
    SYNC_CYCLES.with_label_values(&[status, trigger]).inc();
    SYNC_DURATION
        .with_label_values(&[status])
        .observe(duration_secs);
}

/// Record verdicts written in one go.
pub fn record_verdicts(status: &str, method: &str, count: usize) {
    if count > 0 {
        VERDICTS
            .with_label_values(&[status, method])
            .inc_by(count as f64);
    }
}

/// Record a failed collaborator call.
pub fn record_fetch_failure(operation: &str, kind: &str) {
    FETCH_FAILURES.with_label_values(&[operation, kind]).inc();
}

/// Publish the current alert counts.
pub fn set_active_alerts(critical: usize, warning: usize) {
    ACTIVE_ALERTS
        .with_label_values(&["critical"])
        .set(critical as i64);
    ACTIVE_ALERTS
        .with_label_values(&["warning"])
        .set(warning as i64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}

/// Per-request HTTP metrics, labelled by matched route rather than raw path.
pub async fn http_metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS
        .with_label_values(&[&method, &route, &status])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &route])
        .observe(start.elapsed().as_secs_f64());

    response
}

use crate::services::get_metrics;
use crate::startup::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

/// Liveness probe.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "reconciliation-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe. The service holds its state in memory, so it is ready as
/// soon as it accepts connections; the last sync is reported for operators.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.service.sync_status().await;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "syncing": status.syncing,
            "last_sync": status.last_sync,
        })),
    )
}

/// Metrics endpoint for Prometheus scraping.
pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

use crate::models::{SyncResult, SyncStatus, SyncStatusView};
use crate::startup::AppState;
use axum::{Json, extract::State, http::StatusCode};

/// Interactive sync. Skipped cycles answer 409, failed ones 502.
pub async fn trigger_sync(State(state): State<AppState>) -> (StatusCode, Json<SyncResult>) {
    let result = state.service.sync_now(false).await;

    let status = match result.status {
        SyncStatus::Completed => StatusCode::OK,
        SyncStatus::Skipped => StatusCode::CONFLICT,
        SyncStatus::Failed => StatusCode::BAD_GATEWAY,
    };

    (status, Json(result))
}

pub async fn sync_status(State(state): State<AppState>) -> Json<SyncStatusView> {
    Json(state.service.sync_status().await)
}

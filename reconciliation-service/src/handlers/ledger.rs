use crate::dtos::{AuditListParams, CashFlowParams, HistoryParams, TransactionListParams};
use crate::models::{
    Account, Alert, AuditRecord, CashFlowStats, HistoryEntry, ReconciliationSummary, Transaction,
};
use crate::startup::AppState;
use axum::{
    Json,
    extract::{Query, State},
};
use service_core::error::AppError;

pub async fn list_accounts(State(state): State<AppState>) -> Json<Vec<Account>> {
    Json(state.service.accounts().await)
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<TransactionListParams>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let status = params
        .status_filter()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    Ok(Json(state.service.transactions(status).await))
}

pub async fn list_alerts(State(state): State<AppState>) -> Json<Vec<Alert>> {
    Json(state.service.alerts().await)
}

pub async fn list_audit(
    State(state): State<AppState>,
    Query(params): Query<AuditListParams>,
) -> Json<Vec<AuditRecord>> {
    Json(state.service.recent_audit(params.limit()).await)
}

pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let filter = params
        .filter()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    Ok(Json(state.service.history(&filter).await))
}

pub async fn cash_flow(
    State(state): State<AppState>,
    Query(params): Query<CashFlowParams>,
) -> Result<Json<CashFlowStats>, AppError> {
    params
        .validate()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    Ok(Json(state.service.cash_flow(params.from, params.to).await))
}

pub async fn summary(State(state): State<AppState>) -> Json<ReconciliationSummary> {
    Json(state.service.summary().await)
}

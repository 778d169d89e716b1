//! Reviewer actions. Every route here passes the access gate first.

use crate::dtos::ManualVerdictRequest;
use crate::models::Transaction;
use crate::services::capabilities;
use crate::startup::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use service_core::error::AppError;

pub async fn set_verdict(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(transaction_id): Path<String>,
    Json(body): Json<ManualVerdictRequest>,
) -> Result<Json<Transaction>, AppError> {
    let auth = state
        .gate
        .require_capability(&headers, capabilities::RECONCILIATION_MATCH_CREATE)
        .await?;

    let tx = state
        .service
        .set_manual_verdict(&transaction_id, body.invoice_id, body.status)
        .await?;

    tracing::info!(user_id = %auth.user_id, transaction_id = %transaction_id, "Manual verdict set");
    Ok(Json(tx))
}

pub async fn accept_suggestion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(transaction_id): Path<String>,
) -> Result<Json<Transaction>, AppError> {
    let auth = state
        .gate
        .require_capability(&headers, capabilities::RECONCILIATION_SUGGESTION_REVIEW)
        .await?;

    let tx = state.service.accept_suggestion(&transaction_id).await?;

    tracing::info!(user_id = %auth.user_id, transaction_id = %transaction_id, "Suggestion accepted");
    Ok(Json(tx))
}

pub async fn reject_suggestion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(transaction_id): Path<String>,
) -> Result<Json<Transaction>, AppError> {
    let auth = state
        .gate
        .require_capability(&headers, capabilities::RECONCILIATION_SUGGESTION_REVIEW)
        .await?;

    let tx = state.service.reject_suggestion(&transaction_id).await?;

    tracing::info!(user_id = %auth.user_id, transaction_id = %transaction_id, "Suggestion rejected");
    Ok(Json(tx))
}

pub async fn undo_match(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(transaction_id): Path<String>,
) -> Result<Json<Transaction>, AppError> {
    let auth = state
        .gate
        .require_capability(&headers, capabilities::RECONCILIATION_MATCH_DELETE)
        .await?;

    let tx = state.service.undo_match(&transaction_id).await?;

    tracing::info!(user_id = %auth.user_id, transaction_id = %transaction_id, "Match undone");
    Ok(Json(tx))
}

//! HTTP handlers for the `/appeals` resource.
//!
//! Handlers only translate between HTTP and [`AppealLifecycle`] calls;
//! every rule about which transition is legal lives below them.
//!
//! [`AppealLifecycle`]: crate::AppealLifecycle

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::extract::OptionalJson;
use super::{ApiError, ErrorBody};
use crate::AppState;
use appeals_core::{
    Appeal, AppealFilter, AppealId, AppealResponse, AppealStatus, BulkCancelResult,
    CancelAllInWork, CancelAppeal, CompleteAppeal, SubmitAppeal,
};

fn appeal_id(path: Result<Path<i64>, PathRejection>) -> Result<AppealId, ApiError> {
    let Path(id) = path.map_err(|e| ApiError::BadRequest(format!("Invalid appeal id: {}", e)))?;
    Ok(AppealId(id))
}

/// Submit a new appeal.
#[utoipa::path(
    post,
    path = "/appeals",
    tag = "appeals",
    request_body = SubmitAppeal,
    responses(
        (status = 201, description = "Appeal created in status New", body = Appeal),
        (status = 400, description = "Blank topic or message, or malformed body", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
pub async fn submit_appeal(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitAppeal>, JsonRejection>,
) -> Result<(StatusCode, Json<Appeal>), ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let appeal = state.lifecycle.submit(&body.topic, &body.message).await?;
    Ok((StatusCode::CREATED, Json(appeal)))
}

/// List appeals, newest first.
#[utoipa::path(
    get,
    path = "/appeals",
    tag = "appeals",
    params(
        ("date" = Option<String>, Query, description = "Only appeals submitted on this UTC day (YYYY-MM-DD)"),
        ("startDate" = Option<String>, Query, description = "First day of an inclusive range; needs endDate"),
        ("endDate" = Option<String>, Query, description = "Last day of an inclusive range; needs startDate"),
        ("status" = Option<AppealStatus>, Query, description = "Only appeals in this status")
    ),
    responses(
        (status = 200, description = "Matching appeals", body = Vec<Appeal>),
        (status = 400, description = "Malformed date or unknown status", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
pub async fn list_appeals(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AppealFilter>, QueryRejection>,
) -> Result<Json<Vec<Appeal>>, ApiError> {
    let Query(filter) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(state.lifecycle.list(&filter).await?))
}

/// Fetch one appeal.
#[utoipa::path(
    get,
    path = "/appeals/{id}",
    tag = "appeals",
    params(("id" = i64, Path, description = "Appeal id")),
    responses(
        (status = 200, description = "The appeal", body = Appeal),
        (status = 400, description = "Non-numeric id", body = ErrorBody),
        (status = 404, description = "No such appeal", body = ErrorBody)
    )
)]
pub async fn get_appeal(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Appeal>, ApiError> {
    let id = appeal_id(path)?;
    Ok(Json(state.lifecycle.get(id).await?))
}

/// Audit responses recorded for an appeal, oldest first.
#[utoipa::path(
    get,
    path = "/appeals/{id}/responses",
    tag = "appeals",
    params(("id" = i64, Path, description = "Appeal id")),
    responses(
        (status = 200, description = "Audit history", body = Vec<AppealResponse>),
        (status = 404, description = "No such appeal", body = ErrorBody)
    )
)]
pub async fn get_responses(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<AppealResponse>>, ApiError> {
    let id = appeal_id(path)?;
    Ok(Json(state.lifecycle.history(id).await?))
}

/// Move a New appeal to InProgress.
#[utoipa::path(
    put,
    path = "/appeals/{id}/take",
    tag = "appeals",
    params(("id" = i64, Path, description = "Appeal id")),
    responses(
        (status = 200, description = "Appeal is now InProgress", body = Appeal),
        (status = 404, description = "Missing or not New", body = ErrorBody)
    )
)]
pub async fn take_appeal(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Appeal>, ApiError> {
    let id = appeal_id(path)?;
    Ok(Json(state.lifecycle.take(id).await?))
}

/// Complete an InProgress appeal.
#[utoipa::path(
    put,
    path = "/appeals/{id}/complete",
    tag = "appeals",
    params(("id" = i64, Path, description = "Appeal id")),
    request_body(content = CompleteAppeal, description = "May be omitted"),
    responses(
        (status = 200, description = "Appeal is now Completed", body = Appeal),
        (status = 400, description = "Malformed body", body = ErrorBody),
        (status = 404, description = "Missing or not InProgress", body = ErrorBody)
    )
)]
pub async fn complete_appeal(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
    body: OptionalJson<CompleteAppeal>,
) -> Result<Json<Appeal>, ApiError> {
    let id = appeal_id(path)?;
    let body = body.into_inner_or_default();
    let appeal = state
        .lifecycle
        .complete(id, body.solution.as_deref())
        .await?;
    Ok(Json(appeal))
}

/// Cancel a New or InProgress appeal.
#[utoipa::path(
    put,
    path = "/appeals/{id}/cancel",
    tag = "appeals",
    params(("id" = i64, Path, description = "Appeal id")),
    request_body(content = CancelAppeal, description = "May be omitted"),
    responses(
        (status = 200, description = "Appeal is now Cancelled", body = Appeal),
        (status = 400, description = "Malformed body", body = ErrorBody),
        (status = 404, description = "Missing or already terminal", body = ErrorBody)
    )
)]
pub async fn cancel_appeal(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
    body: OptionalJson<CancelAppeal>,
) -> Result<Json<Appeal>, ApiError> {
    let id = appeal_id(path)?;
    let body = body.into_inner_or_default();
    let appeal = state
        .lifecycle
        .cancel(id, body.cancellation_reason.as_deref())
        .await?;
    Ok(Json(appeal))
}

/// Cancel every InProgress appeal in one batch.
#[utoipa::path(
    put,
    path = "/appeals/cancel-all-in-work",
    tag = "appeals",
    request_body(content = CancelAllInWork, description = "May be omitted"),
    responses(
        (status = 200, description = "Summary and the cancelled appeals", body = BulkCancelResult),
        (status = 400, description = "Malformed body", body = ErrorBody),
        (status = 500, description = "Storage failure; nothing was cancelled", body = ErrorBody)
    )
)]
pub async fn cancel_all_in_work(
    State(state): State<Arc<AppState>>,
    body: OptionalJson<CancelAllInWork>,
) -> Result<Json<BulkCancelResult>, ApiError> {
    let body = body.into_inner_or_default();
    let result = state
        .lifecycle
        .cancel_all_in_work(body.response_message.as_deref())
        .await?;
    Ok(Json(result))
}

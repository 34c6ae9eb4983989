//! Pending web feedback requests.

use super::{ErrorResponse, error_response};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use feedback_core::{FeedbackError, PendingRequest};
use feedback_types::FeedbackResult;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Serialize)]
pub struct RequestListResponse {
    pub requests: Vec<PendingRequest>,
}

#[derive(Serialize)]
pub struct ReplyResponse {
    pub request_id: Uuid,
    pub status: &'static str,
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<RequestListResponse> {
    Json(RequestListResponse {
        requests: state.web.pending_requests(),
    })
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<PendingRequest> {
    state
        .web
        .get(id)
        .map(Json)
        .ok_or_else(|| error_response(FeedbackError::RequestNotFound(id)))
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(result): Json<FeedbackResult>,
) -> ApiResult<ReplyResponse> {
    state.web.submit(id, result).map_err(error_response)?;
    Ok(Json(ReplyResponse {
        request_id: id,
        status: "submitted",
    }))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<ReplyResponse> {
    state.web.cancel(id).map_err(error_response)?;
    Ok(Json(ReplyResponse {
        request_id: id,
        status: "cancelled",
    }))
}

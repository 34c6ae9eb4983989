//! HTTP route handlers.

pub mod requests;
pub mod tools;

use crate::state::AppState;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use feedback_core::FeedbackError;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub pending_requests: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        pending_requests: state.web.pending_requests().len(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Map a core error onto a status code and JSON body.
pub fn error_response(err: FeedbackError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        FeedbackError::ConfigurationInvalid(_) => StatusCode::BAD_REQUEST,
        FeedbackError::SessionNotFound(_) | FeedbackError::RequestNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        FeedbackError::InvalidTransition { .. } => StatusCode::CONFLICT,
        FeedbackError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// The `/api` routes.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tools", get(tools::list))
        .route("/tools/{name}", post(tools::call))
        .route("/requests", get(requests::list))
        .route("/requests/{id}", get(requests::get))
        .route("/requests/{id}/feedback", post(requests::submit))
        .route("/requests/{id}/cancel", post(requests::cancel))
        .route("/health", get(health))
}

/// Full application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new().nest("/api", api_router()).with_state(state)
}

//! Tool table routes.

use super::{ErrorResponse, error_response};
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use feedback_core::FeedbackError;
use feedback_types::ToolDescriptor;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Serialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDescriptor>,
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.descriptors(),
    })
}

/// Call a tool. An empty body means no arguments.
pub async fn call(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<ErrorResponse>)> {
    let args = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            error_response(FeedbackError::ConfigurationInvalid(format!(
                "request body is not JSON: {}",
                e
            )))
        })?
    };

    info!(target: "feedback::api", "Tool call: {}", name);
    match state.tools.call(&name, args).await {
        Ok(value) => Ok(Json(value)),
        Err(e) => {
            warn!(target: "feedback::api", "Tool {} failed: {}", name, e);
            Err(error_response(e))
        }
    }
}

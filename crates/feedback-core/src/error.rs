//! Error types for the feedback bridge.

use feedback_types::{SessionId, SessionStatus};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Invalid session transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Feedback collection timed out after {0} seconds")]
    Timeout(u64),

    #[error("Feedback request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("Interface backend error: {0}")]
    Backend(String),

    #[error("Session store is not running")]
    StoreUnavailable,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to turn a single image attachment into bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("image has no payload")]
    MissingPayload,

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("unsupported payload representation")]
    UnsupportedRepresentation,
}

//! Feedback session types and lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::FeedbackResult;

/// Identifier of a persistent feedback session.
pub type SessionId = Uuid;

/// Session status in the lifecycle.
///
/// Status only moves forward:
/// `Created -> WaitingFeedback -> {Completed | TimedOut | Expired}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session record allocated, request not yet shown to a human.
    Created,
    /// The request is presented and we are waiting for the human.
    WaitingFeedback,
    /// Feedback was received and attached.
    Completed,
    /// The response window lapsed without feedback.
    TimedOut,
    /// The session was abandoned and can no longer receive feedback.
    Expired,
}

impl SessionStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Expired)
    }

    /// Whether moving from `self` to `next` respects the forward-only lifecycle.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        match (self, next) {
            (Self::Created, Self::WaitingFeedback) => true,
            (Self::Created | Self::WaitingFeedback, n) => n.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::WaitingFeedback => "waiting_feedback",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = crate::UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "waiting_feedback" => Ok(Self::WaitingFeedback),
            "completed" => Ok(Self::Completed),
            "timed_out" => Ok(Self::TimedOut),
            "expired" => Ok(Self::Expired),
            other => Err(crate::UnknownVariant::new("session status", other)),
        }
    }
}

/// A persistent feedback session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Absolute project directory the request refers to.
    pub project_directory: PathBuf,
    /// Summary of the agent's work shown to the human.
    pub summary: String,
    pub created_at: DateTime<Utc>,
    /// Last liveness update. Never moves backwards.
    pub last_heartbeat: DateTime<Utc>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_result: Option<FeedbackResult>,
}

impl Session {
    /// Age measured from the last heartbeat.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.last_heartbeat)
    }
}

/// Summary view of a session for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub project_directory: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: SessionStatus,
    pub has_feedback: bool,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            session_id: s.id,
            project_directory: s.project_directory.clone(),
            created_at: s.created_at,
            last_heartbeat: s.last_heartbeat,
            status: s.status,
            has_feedback: s.feedback_result.is_some(),
        }
    }
}

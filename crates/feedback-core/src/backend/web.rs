//! Web backend: requests wait in memory until answered over HTTP.

use super::{BackendOutcome, InterfaceBackend, LaunchRequest};
use crate::{FeedbackError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use feedback_types::{FeedbackResult, InterfaceKind};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A feedback request waiting for its answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRequest {
    pub id: Uuid,
    pub project_directory: PathBuf,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub timeout_secs: u64,
}

enum WebReply {
    Submit(FeedbackResult),
    Cancel,
}

struct PendingEntry {
    info: PendingRequest,
    reply: oneshot::Sender<WebReply>,
}

pub struct WebBackend {
    pending: DashMap<Uuid, PendingEntry>,
    ready: AtomicBool,
    base_url: String,
}

impl WebBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            pending: DashMap::new(),
            ready: AtomicBool::new(false),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Requests still waiting, oldest first.
    pub fn pending_requests(&self) -> Vec<PendingRequest> {
        let mut requests: Vec<PendingRequest> =
            self.pending.iter().map(|e| e.info.clone()).collect();
        requests.sort_by_key(|r| r.created_at);
        requests
    }

    pub fn get(&self, id: Uuid) -> Option<PendingRequest> {
        self.pending.get(&id).map(|e| e.info.clone())
    }

    /// Answer a pending request with the user's feedback.
    pub fn submit(&self, id: Uuid, result: FeedbackResult) -> Result<()> {
        self.reply(id, WebReply::Submit(result))?;
        info!(target: "feedback::backend", "Feedback submitted for request {}", id);
        Ok(())
    }

    /// Dismiss a pending request without feedback.
    pub fn cancel(&self, id: Uuid) -> Result<()> {
        self.reply(id, WebReply::Cancel)?;
        info!(target: "feedback::backend", "Request {} cancelled", id);
        Ok(())
    }

    fn reply(&self, id: Uuid, reply: WebReply) -> Result<()> {
        let (_, entry) = self
            .pending
            .remove(&id)
            .ok_or(FeedbackError::RequestNotFound(id))?;
        // The waiter is gone if the request timed out in the meantime.
        entry
            .reply
            .send(reply)
            .map_err(|_| FeedbackError::RequestNotFound(id))
    }
}

#[async_trait]
impl InterfaceBackend for WebBackend {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::Web
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn prepare(&self) -> Result<()> {
        if !self.ready.swap(true, Ordering::SeqCst) {
            debug!(target: "feedback::backend", "Web backend ready at {}", self.base_url);
        }
        Ok(())
    }

    async fn launch(&self, request: LaunchRequest) -> BackendOutcome {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let info = PendingRequest {
            id,
            project_directory: request.project_directory,
            summary: request.summary,
            created_at: Utc::now(),
            timeout_secs: request.timeout.as_secs(),
        };
        self.pending.insert(id, PendingEntry { info, reply: tx });

        info!(
            target: "feedback::backend",
            "Waiting for feedback at {}/api/requests/{}",
            self.base_url,
            id
        );

        let outcome = match tokio::time::timeout(request.timeout, rx).await {
            Ok(Ok(WebReply::Submit(result))) => BackendOutcome::Submitted(result),
            Ok(Ok(WebReply::Cancel)) => BackendOutcome::Cancelled,
            Ok(Err(_)) => {
                warn!(target: "feedback::backend", "Request {} dropped without a reply", id);
                BackendOutcome::Cancelled
            }
            Err(_) => BackendOutcome::Timeout,
        };

        self.pending.remove(&id);
        outcome
    }
}

//! Feedback collection entry point.
//!
//! Decides which interface to use, optionally tracks the request as a
//! persistent session, dispatches to the backend and turns whatever comes
//! back into content for the agent. Backend failures never escape as errors;
//! every path ends in a [`FeedbackOutcome`].

use crate::backend::{BackendOutcome, LaunchRequest};
use crate::cache::{self, PerformanceCache};
use crate::codec::{self, NormalizeOptions};
use crate::store::SessionStore;
use crate::toggles::{ToggleSource, Toggles};
use crate::FeedbackError;
use feedback_types::{ContentItem, FeedbackResult, InterfaceKind, SessionId, SessionStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Minimum wait for a persistent session.
pub const PERSISTENT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Save every collected result as a JSON document.
    pub persist_results: bool,
    /// Where results are saved; the temp directory when unset.
    pub results_dir: Option<PathBuf>,
    /// Lower bound on the timeout of persistent requests.
    pub persistent_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            persist_results: true,
            results_dir: None,
            persistent_timeout: PERSISTENT_TIMEOUT,
        }
    }
}

/// How a feedback request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    Completed {
        contents: Vec<ContentItem>,
        session_id: Option<SessionId>,
        saved_to: Option<PathBuf>,
    },
    /// Persistent request ran out of time; the session can still be answered.
    Preserved { session_id: SessionId, timeout_secs: u64 },
    Cancelled { session_id: Option<SessionId> },
    TimedOut { timeout_secs: u64 },
    Error { message: String },
}

impl FeedbackOutcome {
    /// Content list handed back to the agent.
    pub fn into_contents(self) -> Vec<ContentItem> {
        match self {
            FeedbackOutcome::Completed { contents, .. } => contents,
            FeedbackOutcome::Preserved {
                session_id,
                timeout_secs,
            } => vec![ContentItem::text(format!(
                "Session {} has been preserved and can be restored later. \
                 No feedback arrived within {} seconds.",
                session_id, timeout_secs
            ))],
            FeedbackOutcome::Cancelled { .. } => {
                vec![ContentItem::text("User cancelled the feedback request.")]
            }
            FeedbackOutcome::TimedOut { timeout_secs } => vec![ContentItem::text(format!(
                "{}.",
                FeedbackError::Timeout(timeout_secs)
            ))],
            FeedbackOutcome::Error { message } => {
                vec![ContentItem::text(format!("Feedback collection error: {}", message))]
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, FeedbackOutcome::Completed { .. })
    }
}

/// Steps of a single collection, logged as they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectionState {
    Init,
    EnvironmentResolved,
    SessionCreated,
    AwaitingResult,
    Completed,
    Preserved,
    TimedOut,
    Cancelled,
    Errored,
}

struct Collection {
    id: Uuid,
    state: CollectionState,
}

impl Collection {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: CollectionState::Init,
        }
    }

    fn advance(&mut self, next: CollectionState) {
        debug!(
            target: "feedback::orchestrator",
            "Collection {}: {:?} -> {:?}",
            self.id,
            self.state,
            next
        );
        self.state = next;
    }
}

pub struct Orchestrator {
    store: SessionStore,
    cache: Arc<PerformanceCache>,
    toggles: Arc<dyn ToggleSource>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        store: SessionStore,
        cache: Arc<PerformanceCache>,
        toggles: Arc<dyn ToggleSource>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            cache,
            toggles,
            config,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn cache(&self) -> &Arc<PerformanceCache> {
        &self.cache
    }

    /// Current toggles.
    pub fn toggles(&self) -> Toggles {
        self.toggles.read()
    }

    /// Collect feedback for a piece of finished work.
    pub async fn collect_feedback(
        &self,
        project_directory: &str,
        summary: &str,
        timeout_secs: u64,
    ) -> FeedbackOutcome {
        let toggles = self.toggles.read();
        let mut collection = Collection::new();

        if toggles.fast_launch {
            self.cache.enable_performance_optimizations().await;
        }
        if toggles.persistent {
            if let Err(e) = self.store.start_heartbeat().await {
                warn!(target: "feedback::orchestrator", "Failed to start heartbeat: {}", e);
            }
        }

        let kind = self.resolve_interface(&toggles).await;
        collection.advance(CollectionState::EnvironmentResolved);

        let project_directory = resolve_project_directory(project_directory);
        if toggles.debug {
            info!(
                target: "feedback::orchestrator",
                "Collecting feedback via {} for {} (persistent={}, fast_launch={})",
                kind,
                project_directory.display(),
                toggles.persistent,
                toggles.fast_launch
            );
        } else {
            debug!(
                target: "feedback::orchestrator",
                "Collecting feedback via {} for {}",
                kind,
                project_directory.display()
            );
        }

        let requested = Duration::from_secs(timeout_secs);
        let (session_id, timeout) = if toggles.persistent {
            match self
                .store
                .create_persistent_session(&project_directory, summary)
                .await
            {
                Ok(id) => {
                    collection.advance(CollectionState::SessionCreated);
                    (Some(id), requested.max(self.config.persistent_timeout))
                }
                Err(e) => {
                    collection.advance(CollectionState::Errored);
                    return FeedbackOutcome::Error {
                        message: e.to_string(),
                    };
                }
            }
        } else {
            (None, requested)
        };

        collection.advance(CollectionState::AwaitingResult);
        let outcome = if toggles.fast_launch {
            self.cache
                .fast_launch_interface(kind, &project_directory, summary, timeout)
                .await
        } else {
            self.launch(kind, &project_directory, summary, timeout).await
        };

        match outcome {
            BackendOutcome::Submitted(result) => {
                collection.advance(CollectionState::Completed);
                self.complete(result, session_id, &toggles).await
            }
            BackendOutcome::Timeout => match session_id {
                Some(session_id) => {
                    collection.advance(CollectionState::Preserved);
                    info!(
                        target: "feedback::orchestrator",
                        "Timed out waiting on persistent session {}, preserved",
                        session_id
                    );
                    FeedbackOutcome::Preserved {
                        session_id,
                        timeout_secs: timeout.as_secs(),
                    }
                }
                None => {
                    collection.advance(CollectionState::TimedOut);
                    warn!(target: "feedback::orchestrator", "{}", FeedbackError::Timeout(timeout.as_secs()));
                    FeedbackOutcome::TimedOut {
                        timeout_secs: timeout.as_secs(),
                    }
                }
            },
            BackendOutcome::Cancelled => {
                collection.advance(CollectionState::Cancelled);
                self.expire(session_id).await;
                FeedbackOutcome::Cancelled { session_id }
            }
            BackendOutcome::Failed(message) => {
                collection.advance(CollectionState::Errored);
                warn!(target: "feedback::orchestrator", "Feedback collection failed: {}", message);
                self.expire(session_id).await;
                FeedbackOutcome::Error { message }
            }
        }
    }

    async fn resolve_interface(&self, toggles: &Toggles) -> InterfaceKind {
        if toggles.force_web {
            return InterfaceKind::Web;
        }
        if toggles.fast_launch {
            return self.cache.get_optimal_interface_choice(false).await;
        }
        let signals = self.cache.environment_signals();
        cache::detect_with(self.cache.backends(), &signals)
            .await
            .interface(false)
    }

    async fn launch(
        &self,
        kind: InterfaceKind,
        project_directory: &Path,
        summary: &str,
        timeout: Duration,
    ) -> BackendOutcome {
        let backend = self.cache.backends().get(kind);
        if let Err(e) = backend.prepare().await {
            return BackendOutcome::Failed(e.to_string());
        }
        backend
            .launch(LaunchRequest {
                project_directory: project_directory.to_path_buf(),
                summary: summary.to_string(),
                timeout,
            })
            .await
    }

    async fn complete(
        &self,
        result: FeedbackResult,
        session_id: Option<SessionId>,
        toggles: &Toggles,
    ) -> FeedbackOutcome {
        if let Some(id) = session_id {
            if let Err(e) = self.store.update_session_feedback(id, result.clone()).await {
                warn!(target: "feedback::orchestrator", "Failed to record feedback on session {}: {}", id, e);
            }
        }

        let saved_to = if self.config.persist_results {
            let path = self
                .config
                .results_dir
                .as_ref()
                .map(|dir| dir.join(format!("feedback_{}.json", Uuid::new_v4())));
            match codec::persist(&result, path.as_deref()) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(target: "feedback::orchestrator", "Failed to save feedback: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let contents = codec::normalize(
            &result,
            NormalizeOptions {
                include_full_base64: toggles.include_base64,
            },
        );
        info!(
            target: "feedback::orchestrator",
            "Feedback collected ({} items)",
            contents.len()
        );

        FeedbackOutcome::Completed {
            contents,
            session_id,
            saved_to,
        }
    }

    async fn expire(&self, session_id: Option<SessionId>) {
        if let Some(id) = session_id {
            if let Err(e) = self.store.mark_session_status(id, SessionStatus::Expired).await {
                warn!(target: "feedback::orchestrator", "Failed to expire session {}: {}", id, e);
            }
        }
    }
}

/// Existing directory as an absolute path, the working directory otherwise.
fn resolve_project_directory(dir: &str) -> PathBuf {
    let path = Path::new(dir);
    let path = if path.exists() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    };
    std::path::absolute(&path).unwrap_or(path)
}

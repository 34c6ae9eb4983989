//! Interface backends that actually present a feedback request to a human.

mod gui;
mod web;

pub use gui::GuiBackend;
pub use web::{PendingRequest, WebBackend};

use crate::Result;
use async_trait::async_trait;
use feedback_types::{FeedbackResult, InterfaceKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One request to collect feedback.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub project_directory: PathBuf,
    pub summary: String,
    pub timeout: Duration,
}

/// How a launched request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOutcome {
    Submitted(FeedbackResult),
    Timeout,
    Cancelled,
    Failed(String),
}

/// A way of showing a feedback request to the user.
///
/// Backends own the timeout: `launch` must return `BackendOutcome::Timeout`
/// once `request.timeout` has elapsed without an answer.
#[async_trait]
pub trait InterfaceBackend: Send + Sync {
    fn kind(&self) -> InterfaceKind;

    /// Cheap capability check used during environment detection.
    async fn is_available(&self) -> bool;

    /// Warm up whatever the backend needs before its first launch.
    async fn prepare(&self) -> Result<()>;

    async fn launch(&self, request: LaunchRequest) -> BackendOutcome;
}

/// The pair of backends available to the orchestrator.
#[derive(Clone)]
pub struct Backends {
    pub web: Arc<dyn InterfaceBackend>,
    pub gui: Arc<dyn InterfaceBackend>,
}

impl Backends {
    pub fn new(web: Arc<dyn InterfaceBackend>, gui: Arc<dyn InterfaceBackend>) -> Self {
        Self { web, gui }
    }

    pub fn get(&self, kind: InterfaceKind) -> &Arc<dyn InterfaceBackend> {
        match kind {
            InterfaceKind::Web => &self.web,
            InterfaceKind::Gui => &self.gui,
        }
    }
}

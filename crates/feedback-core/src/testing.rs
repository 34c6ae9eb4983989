//! Scripted interface backend for unit tests.

use crate::backend::{BackendOutcome, InterfaceBackend, LaunchRequest};
use crate::{FeedbackError, Result};
use async_trait::async_trait;
use feedback_types::InterfaceKind;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct ScriptedBackend {
    kind: InterfaceKind,
    available: bool,
    prepare_ok: bool,
    /// `None` waits out the request timeout.
    outcome: Option<BackendOutcome>,
    pub probe_calls: AtomicUsize,
    pub prepare_calls: AtomicUsize,
    pub launches: Mutex<Vec<LaunchRequest>>,
}

impl ScriptedBackend {
    pub fn new(kind: InterfaceKind) -> Self {
        Self {
            kind,
            available: true,
            prepare_ok: true,
            outcome: None,
            probe_calls: AtomicUsize::new(0),
            prepare_calls: AtomicUsize::new(0),
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self.prepare_ok = false;
        self
    }

    pub fn with_outcome(mut self, outcome: BackendOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn probes(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn prepares(&self) -> usize {
        self.prepare_calls.load(Ordering::SeqCst)
    }

    pub fn launched(&self) -> Vec<LaunchRequest> {
        self.launches.lock().unwrap().clone()
    }
}

#[async_trait]
impl InterfaceBackend for ScriptedBackend {
    fn kind(&self) -> InterfaceKind {
        self.kind
    }

    async fn is_available(&self) -> bool {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.available
    }

    async fn prepare(&self) -> Result<()> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        if self.prepare_ok {
            Ok(())
        } else {
            Err(FeedbackError::Backend(format!("{} unavailable", self.kind)))
        }
    }

    async fn launch(&self, request: LaunchRequest) -> BackendOutcome {
        let timeout = request.timeout;
        self.launches.lock().unwrap().push(request);
        match &self.outcome {
            Some(outcome) => outcome.clone(),
            None => {
                tokio::time::sleep(timeout).await;
                BackendOutcome::Timeout
            }
        }
    }
}

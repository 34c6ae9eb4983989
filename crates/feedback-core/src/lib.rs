//! Core feedback collection: sessions, interface selection, backends and
//! result normalization.

pub mod backend;
pub mod cache;
pub mod codec;
mod db;
pub mod environment;
mod error;
pub mod orchestrator;
pub mod store;
pub mod toggles;
pub mod tools;

#[cfg(test)]
mod testing;

pub use backend::{
    BackendOutcome, Backends, GuiBackend, InterfaceBackend, LaunchRequest, PendingRequest,
    WebBackend,
};
pub use cache::{PerformanceCache, PerformanceStats};
pub use codec::NormalizeOptions;
pub use environment::{Detection, EnvironmentSignals};
pub use error::{CodecError, FeedbackError};
pub use orchestrator::{FeedbackOutcome, Orchestrator, OrchestratorConfig};
pub use store::{SessionStore, SessionStoreConfig};
pub use toggles::{EnvToggles, ToggleSource, Toggles};
pub use tools::Tools;

/// Result type for feedback operations.
pub type Result<T> = std::result::Result<T, FeedbackError>;

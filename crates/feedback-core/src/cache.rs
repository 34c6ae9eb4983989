//! Interface choice cache and backend preloading.
//!
//! Full environment detection can spawn the GUI probe, so its result is
//! cached per environment fingerprint for a limited time, both in memory and
//! in a small JSON file that survives restarts.

use crate::backend::{BackendOutcome, Backends, InterfaceBackend, LaunchRequest};
use crate::environment::{self, Detection, EnvironmentSignals};
use chrono::{DateTime, Utc};
use feedback_types::InterfaceKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How long a cached detection stays valid.
pub const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

const CACHE_FILE_NAME: &str = "performance_cache.json";

/// A detection result for one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub detection: Detection,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub gui_preloaded: bool,
    pub web_backend_ready: bool,
    pub cache_age_seconds: Option<i64>,
    pub cache_file: PathBuf,
}

#[derive(Debug, Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    gui_preloaded: bool,
    web_backend_ready: bool,
    preload_started: bool,
    /// Bumped on clear so late preload completions are discarded.
    generation: u64,
}

type SignalSource = Arc<dyn Fn() -> EnvironmentSignals + Send + Sync>;

pub struct PerformanceCache {
    state: Arc<RwLock<CacheState>>,
    backends: Backends,
    cache_file: PathBuf,
    ttl: chrono::Duration,
    signals: SignalSource,
}

impl PerformanceCache {
    /// Create a cache stored in `cache_dir`, loading any previous entry.
    pub fn new(backends: Backends, cache_dir: &Path) -> Self {
        let cache_file = cache_dir.join(CACHE_FILE_NAME);
        let entry = load_entry(&cache_file);

        Self {
            state: Arc::new(RwLock::new(CacheState {
                entry,
                ..Default::default()
            })),
            backends,
            cache_file,
            ttl: chrono::Duration::from_std(CACHE_TTL).unwrap_or(chrono::Duration::MAX),
            signals: Arc::new(EnvironmentSignals::capture),
        }
    }

    /// Replace where environment signals come from.
    pub fn with_signal_source(
        mut self,
        source: impl Fn() -> EnvironmentSignals + Send + Sync + 'static,
    ) -> Self {
        self.signals = Arc::new(source);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// Current environment signals.
    pub fn environment_signals(&self) -> EnvironmentSignals {
        (self.signals)()
    }

    /// Pick an interface, reusing a fresh cached detection when possible.
    pub async fn get_optimal_interface_choice(&self, force_web: bool) -> InterfaceKind {
        if force_web {
            return InterfaceKind::Web;
        }
        self.detection().await.interface(false)
    }

    /// Detection for the current environment, cached or fresh.
    pub async fn detection(&self) -> Detection {
        let signals = self.environment_signals();
        let fingerprint = signals.fingerprint();

        if let Some(detection) = self.cached(&fingerprint).await {
            debug!(target: "feedback::cache", "Using cached environment detection");
            return detection;
        }

        let detection = detect_with(&self.backends, &signals).await;
        let entry = CacheEntry {
            fingerprint,
            detection,
            timestamp: Utc::now(),
        };

        if let Err(e) = save_entry(&self.cache_file, &entry) {
            warn!(target: "feedback::cache", "Failed to save performance cache: {}", e);
        }
        self.state.write().await.entry = Some(entry);

        detection
    }

    async fn cached(&self, fingerprint: &str) -> Option<Detection> {
        let state = self.state.read().await;
        let entry = state.entry.as_ref()?;
        let fresh = Utc::now() - entry.timestamp < self.ttl;
        (fresh && entry.fingerprint == fingerprint).then_some(entry.detection)
    }

    /// Start preparing both backends in the background. Idempotent.
    pub async fn enable_performance_optimizations(&self) {
        let generation = {
            let mut state = self.state.write().await;
            if state.preload_started {
                return;
            }
            state.preload_started = true;
            state.generation
        };

        info!(target: "feedback::cache", "Preloading interface backends");
        for backend in [self.backends.gui.clone(), self.backends.web.clone()] {
            tokio::spawn(preload(backend, self.state.clone(), generation));
        }
    }

    /// Launch through a backend, skipping `prepare` when it was preloaded.
    pub async fn fast_launch_interface(
        &self,
        kind: InterfaceKind,
        project_directory: &Path,
        summary: &str,
        timeout: Duration,
    ) -> BackendOutcome {
        let backend = self.backends.get(kind);
        if !self.is_preloaded(kind).await {
            debug!(target: "feedback::cache", "{} backend not preloaded, preparing now", kind);
            if let Err(e) = backend.prepare().await {
                return BackendOutcome::Failed(e.to_string());
            }
        }

        backend
            .launch(LaunchRequest {
                project_directory: project_directory.to_path_buf(),
                summary: summary.to_string(),
                timeout,
            })
            .await
    }

    pub async fn is_preloaded(&self, kind: InterfaceKind) -> bool {
        let state = self.state.read().await;
        match kind {
            InterfaceKind::Gui => state.gui_preloaded,
            InterfaceKind::Web => state.web_backend_ready,
        }
    }

    /// Forget the cached detection and preload state.
    ///
    /// Returns whether a cache file existed on disk.
    pub async fn clear_cache(&self) -> bool {
        let existed = match std::fs::remove_file(&self.cache_file) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(target: "feedback::cache", "Failed to remove cache file: {}", e);
                false
            }
        };

        let mut state = self.state.write().await;
        let generation = state.generation + 1;
        *state = CacheState {
            generation,
            ..Default::default()
        };

        info!(target: "feedback::cache", "Performance cache cleared");
        existed
    }

    pub async fn get_performance_stats(&self) -> PerformanceStats {
        let state = self.state.read().await;
        PerformanceStats {
            gui_preloaded: state.gui_preloaded,
            web_backend_ready: state.web_backend_ready,
            cache_age_seconds: state
                .entry
                .as_ref()
                .map(|e| (Utc::now() - e.timestamp).num_seconds()),
            cache_file: self.cache_file.clone(),
        }
    }
}

/// Run full detection, probing the GUI backend only for local contexts.
pub async fn detect_with(backends: &Backends, signals: &EnvironmentSignals) -> Detection {
    let gui_available = if signals.is_remote() {
        false
    } else {
        backends.gui.is_available().await
    };
    environment::detect(signals, || gui_available)
}

async fn preload(backend: Arc<dyn InterfaceBackend>, state: Arc<RwLock<CacheState>>, generation: u64) {
    let kind = backend.kind();
    match backend.prepare().await {
        Ok(()) => {
            let mut state = state.write().await;
            if state.generation != generation {
                return;
            }
            match kind {
                InterfaceKind::Gui => state.gui_preloaded = true,
                InterfaceKind::Web => state.web_backend_ready = true,
            }
            debug!(target: "feedback::cache", "{} backend preloaded", kind);
        }
        Err(e) => {
            debug!(target: "feedback::cache", "{} backend preload failed: {}", kind, e);
        }
    }
}

fn load_entry(path: &Path) -> Option<CacheEntry> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(entry) => Some(entry),
        Err(e) => {
            debug!(target: "feedback::cache", "Ignoring unreadable cache file: {}", e);
            None
        }
    }
}

fn save_entry(path: &Path, entry: &CacheEntry) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(entry)?)?;
    Ok(())
}

//! Shared application state.

use crate::config::Config;
use feedback_core::{
    Backends, EnvToggles, GuiBackend, Orchestrator, OrchestratorConfig, PerformanceCache,
    SessionStore, SessionStoreConfig, ToggleSource, Tools, WebBackend,
};
use std::sync::Arc;

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub tools: Tools,
    /// Pending web requests, answered by the request routes.
    pub web: Arc<WebBackend>,
    pub store: SessionStore,
    pub config: Config,
}

impl AppState {
    /// Build state reading toggles from the process environment.
    pub fn new(config: Config) -> feedback_core::Result<Self> {
        Self::with_toggles(config, Arc::new(EnvToggles))
    }

    pub fn with_toggles(
        config: Config,
        toggles: Arc<dyn ToggleSource>,
    ) -> feedback_core::Result<Self> {
        let store = SessionStore::open(SessionStoreConfig {
            db_path: Some(config.db_path()),
            heartbeat_interval: config.heartbeat_interval(),
            waiting_window: config.persistent_timeout(),
            ..Default::default()
        })?;

        let web = Arc::new(WebBackend::new(config.base_url()));
        let gui = Arc::new(GuiBackend::new(config.gui_command.clone()));
        let cache = PerformanceCache::new(Backends::new(web.clone(), gui), &config.data_dir);

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            Arc::new(cache),
            toggles,
            OrchestratorConfig {
                persist_results: config.persist_results,
                results_dir: config.results_dir.clone(),
                persistent_timeout: config.persistent_timeout(),
            },
        ));

        Ok(Self {
            tools: Tools::new(orchestrator.clone()),
            orchestrator,
            web,
            store,
            config,
        })
    }
}

//! Operations exposed to the agent host.
//!
//! Every tool has a descriptor with a JSON schema for its arguments and a
//! handler in [`Tools::call`]. Arguments are validated at the boundary;
//! anything that does not fit becomes `ConfigurationInvalid`.

use crate::cache::{self, PerformanceStats};
use crate::environment::EnvironmentSignals;
use crate::orchestrator::Orchestrator;
use crate::{FeedbackError, Result};
use feedback_types::{FeedbackResult, InterfaceKind, SessionStatus, SessionSummary, ToolDescriptor};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_SUMMARY: &str = "I have completed the task you requested.";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MAX_AGE_HOURS: u64 = 24;

const PRELOAD_GRACE: Duration = Duration::from_secs(2);
const PRELOAD_POLL: Duration = Duration::from_millis(50);
const STALE_CACHE_SECS: i64 = 30 * 60;

/// Descriptors of every tool, in a stable order.
pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "collect_feedback",
            description: "Show the user a summary of the finished work and wait for their \
                          feedback (text, command logs and images).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project_directory": {"type": "string", "default": "."},
                    "summary": {"type": "string", "default": DEFAULT_SUMMARY},
                    "timeout": {"type": "integer", "minimum": 0, "default": DEFAULT_TIMEOUT_SECS}
                },
                "additionalProperties": false
            }),
        },
        ToolDescriptor {
            name: "get_system_info",
            description: "Report the detected environment, interface choice and session state.",
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        ToolDescriptor {
            name: "manage_sessions",
            description: "List, restore or clean up persistent feedback sessions.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["list", "restore", "cleanup"], "default": "list"},
                    "session_id": {"type": "string"},
                    "max_age_hours": {"type": "integer", "minimum": 0, "default": DEFAULT_MAX_AGE_HOURS}
                },
                "additionalProperties": false
            }),
        },
        ToolDescriptor {
            name: "optimize_performance",
            description: "Preload interfaces, benchmark startup, clear the detection cache or \
                          report its status.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["preload", "benchmark", "clear_cache", "status"],
                        "default": "status"
                    }
                },
                "additionalProperties": false
            }),
        },
    ]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CollectFeedbackArgs {
    #[serde(default = "default_project_directory")]
    project_directory: String,
    #[serde(default = "default_summary")]
    summary: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

fn default_project_directory() -> String {
    ".".to_string()
}

fn default_summary() -> String {
    DEFAULT_SUMMARY.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManageSessionsArgs {
    #[serde(default = "default_sessions_action")]
    action: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default = "default_max_age_hours")]
    max_age_hours: u64,
}

fn default_sessions_action() -> String {
    "list".to_string()
}

fn default_max_age_hours() -> u64 {
    DEFAULT_MAX_AGE_HOURS
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptimizeArgs {
    #[serde(default = "default_optimize_action")]
    action: String,
}

fn default_optimize_action() -> String {
    "status".to_string()
}

/// Failed action, reported as data rather than an error.
#[derive(Debug, Serialize)]
pub struct ActionFailure {
    pub action: String,
    pub success: bool,
    pub error: String,
}

impl ActionFailure {
    fn new(action: &str, error: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            success: false,
            error: error.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub platform: String,
    pub is_remote: bool,
    pub gui_capable: bool,
    pub recommended_interface: InterfaceKind,
    pub persistent_mode: bool,
    pub active_session_count: usize,
    pub performance_stats: PerformanceStats,
    pub environment_signals: EnvironmentSignals,
}

#[derive(Debug, Serialize)]
struct SessionList {
    action: &'static str,
    success: bool,
    active_sessions: usize,
    sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
struct RestoredSession {
    action: &'static str,
    success: bool,
    session_id: Uuid,
    project_directory: PathBuf,
    summary: String,
    status: SessionStatus,
    feedback_result: Option<FeedbackResult>,
}

#[derive(Debug, Serialize)]
struct CleanupReport {
    action: &'static str,
    success: bool,
    removed: usize,
    max_age_hours: u64,
}

/// The tool table, bound to one orchestrator.
#[derive(Clone)]
pub struct Tools {
    orchestrator: Arc<Orchestrator>,
}

impl Tools {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        descriptors()
    }

    /// Invoke a tool by name.
    pub async fn call(&self, name: &str, args: Value) -> Result<Value> {
        debug!(target: "feedback::tools", "Calling tool {}", name);
        match name {
            "collect_feedback" => {
                let args: CollectFeedbackArgs = parse_args(name, args)?;
                let contents = self
                    .orchestrator
                    .collect_feedback(&args.project_directory, &args.summary, args.timeout)
                    .await
                    .into_contents();
                Ok(serde_json::to_value(contents)?)
            }
            "get_system_info" => {
                let _: NoArgs = parse_args(name, args)?;
                Ok(serde_json::to_value(self.system_info().await?)?)
            }
            "manage_sessions" => {
                let args: ManageSessionsArgs = parse_args(name, args)?;
                self.manage_sessions(args).await
            }
            "optimize_performance" => {
                let args: OptimizeArgs = parse_args(name, args)?;
                self.optimize_performance(&args.action).await
            }
            other => Err(FeedbackError::ConfigurationInvalid(format!(
                "unknown tool: {}",
                other
            ))),
        }
    }

    pub async fn system_info(&self) -> Result<SystemInfo> {
        let cache = self.orchestrator.cache();
        let signals = cache.environment_signals();
        let detection = cache::detect_with(cache.backends(), &signals).await;
        let active = self.orchestrator.store().get_active_sessions().await?;

        Ok(SystemInfo {
            platform: signals.platform.clone(),
            is_remote: detection.is_remote,
            gui_capable: detection.gui_capable,
            recommended_interface: detection.interface(false),
            persistent_mode: self.orchestrator.toggles().persistent,
            active_session_count: active.len(),
            performance_stats: cache.get_performance_stats().await,
            environment_signals: signals,
        })
    }

    async fn manage_sessions(&self, args: ManageSessionsArgs) -> Result<Value> {
        let store = self.orchestrator.store();
        let action = args.action.as_str();

        let response = match action {
            "list" => {
                let sessions = store.get_active_sessions().await?;
                serde_json::to_value(SessionList {
                    action: "list",
                    success: true,
                    active_sessions: sessions.len(),
                    sessions: sessions.iter().map(SessionSummary::from).collect(),
                })?
            }
            "restore" => {
                let Some(raw_id) = args.session_id.filter(|s| !s.is_empty()) else {
                    return Ok(serde_json::to_value(ActionFailure::new(
                        action,
                        "session_id is required",
                    ))?);
                };
                let session = match Uuid::parse_str(&raw_id) {
                    Ok(id) => store.restore_session(id).await?,
                    Err(_) => None,
                };
                match session {
                    Some(session) => {
                        info!(target: "feedback::tools", "Restored session {}", session.id);
                        serde_json::to_value(RestoredSession {
                            action: "restore",
                            success: true,
                            session_id: session.id,
                            project_directory: session.project_directory,
                            summary: session.summary,
                            status: session.status,
                            feedback_result: session.feedback_result,
                        })?
                    }
                    None => serde_json::to_value(ActionFailure::new(
                        action,
                        format!("Session {} not found or expired", raw_id),
                    ))?,
                }
            }
            "cleanup" => {
                let removed = store.cleanup_old_sessions(args.max_age_hours).await?;
                serde_json::to_value(CleanupReport {
                    action: "cleanup",
                    success: true,
                    removed,
                    max_age_hours: args.max_age_hours,
                })?
            }
            other => serde_json::to_value(ActionFailure::new(
                other,
                format!(
                    "Unsupported action: {}. Supported actions: list, restore, cleanup",
                    other
                ),
            ))?,
        };

        Ok(response)
    }

    async fn optimize_performance(&self, action: &str) -> Result<Value> {
        let cache = self.orchestrator.cache();

        let response = match action {
            "preload" => {
                let started = Instant::now();
                cache.enable_performance_optimizations().await;

                let deadline = started + PRELOAD_GRACE;
                let mut stats = cache.get_performance_stats().await;
                while !(stats.gui_preloaded && stats.web_backend_ready) && Instant::now() < deadline {
                    tokio::time::sleep(PRELOAD_POLL).await;
                    stats = cache.get_performance_stats().await;
                }

                json!({
                    "action": "preload",
                    "success": true,
                    "preload_time": round_to(started.elapsed().as_secs_f64(), 2),
                    "status": stats,
                    "message": "Interfaces preloaded; the next launch will be faster",
                })
            }
            "benchmark" => {
                let started = Instant::now();
                let signals = cache.environment_signals();
                let detection = cache::detect_with(cache.backends(), &signals).await;
                let detection_time = started.elapsed();

                let choice_started = Instant::now();
                let force_web = self.orchestrator.toggles().force_web;
                let selected = cache.get_optimal_interface_choice(force_web).await;
                let choice_time = choice_started.elapsed();

                json!({
                    "action": "benchmark",
                    "success": true,
                    "timings": {
                        "environment_detection": round_to(detection_time.as_secs_f64(), 3),
                        "interface_choice": round_to(choice_time.as_secs_f64(), 3),
                        "total_startup_overhead": round_to(started.elapsed().as_secs_f64(), 3),
                    },
                    "environment": {
                        "is_remote": detection.is_remote,
                        "gui_capable": detection.gui_capable,
                        "selected_interface": selected,
                    },
                    "performance_status": cache.get_performance_stats().await,
                })
            }
            "clear_cache" => {
                let existed = cache.clear_cache().await;
                json!({
                    "action": "clear_cache",
                    "success": true,
                    "cache_existed": existed,
                    "cache_file": cache.cache_file(),
                    "message": "Detection cache cleared; the environment will be detected again",
                })
            }
            "status" => {
                let stats = cache.get_performance_stats().await;
                json!({
                    "action": "status",
                    "success": true,
                    "cache_age_seconds": stats.cache_age_seconds,
                    "recommendations": recommendations(&stats),
                    "performance_stats": stats,
                })
            }
            other => serde_json::to_value(ActionFailure::new(
                other,
                format!(
                    "Unsupported action: {}. Supported actions: preload, benchmark, clear_cache, status",
                    other
                ),
            ))?,
        };

        Ok(response)
    }
}

fn recommendations(stats: &PerformanceStats) -> Vec<&'static str> {
    let mut recommendations = Vec::new();
    if !stats.gui_preloaded && !stats.web_backend_ready {
        recommendations.push("Run the preload action to warm up the interfaces");
    }
    if stats.cache_age_seconds.is_some_and(|age| age > STALE_CACHE_SECS) {
        recommendations.push("The detection cache is stale; consider running clear_cache");
    }
    recommendations
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| {
        FeedbackError::ConfigurationInvalid(format!("invalid arguments for {}: {}", tool, e))
    })
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOutcome, Backends};
    use crate::cache::PerformanceCache;
    use crate::orchestrator::OrchestratorConfig;
    use crate::store::SessionStore;
    use crate::testing::ScriptedBackend;
    use crate::toggles::Toggles;
    use std::path::Path;
    use tempfile::TempDir;

    fn tools(temp_dir: &TempDir, outcome: BackendOutcome) -> (Tools, SessionStore) {
        let web = Arc::new(ScriptedBackend::new(InterfaceKind::Web).with_outcome(outcome));
        let gui = Arc::new(ScriptedBackend::new(InterfaceKind::Gui));
        let cache = PerformanceCache::new(Backends::new(web, gui), temp_dir.path())
            .with_signal_source(|| EnvironmentSignals {
                platform: "linux".into(),
                ssh_connection: Some("1.2.3.4 22 5.6.7.8 22".into()),
                ..Default::default()
            });
        let store = SessionStore::in_memory();
        let orchestrator = Orchestrator::new(
            store.clone(),
            Arc::new(cache),
            Arc::new(Toggles::default()),
            OrchestratorConfig {
                persist_results: false,
                ..Default::default()
            },
        );
        (Tools::new(Arc::new(orchestrator)), store)
    }

    #[test]
    fn test_descriptor_table() {
        let names: Vec<&str> = descriptors().iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["collect_feedback", "get_system_info", "manage_sessions", "optimize_performance"]
        );
        for descriptor in descriptors() {
            assert_eq!(descriptor.input_schema["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_collect_feedback_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let (tools, _) = tools(&temp_dir, BackendOutcome::Submitted(FeedbackResult::default()));

        let value = tools.call("collect_feedback", Value::Null).await.unwrap();
        assert_eq!(
            value,
            json!([{"type": "text", "text": "User did not provide any feedback."}])
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments_and_unknown_tool() {
        let temp_dir = TempDir::new().unwrap();
        let (tools, _) = tools(&temp_dir, BackendOutcome::Cancelled);

        let err = tools
            .call("collect_feedback", json!({"timeout": "soon"}))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedbackError::ConfigurationInvalid(_)));

        let err = tools
            .call("manage_sessions", json!({"acton": "list"}))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedbackError::ConfigurationInvalid(_)));

        let err = tools.call("launch_rockets", json!({})).await.unwrap_err();
        assert!(matches!(err, FeedbackError::ConfigurationInvalid(_)));
    }

    #[tokio::test]
    async fn test_restore_unknown_session_reports_failure() {
        let temp_dir = TempDir::new().unwrap();
        let (tools, _) = tools(&temp_dir, BackendOutcome::Cancelled);

        let value = tools
            .call(
                "manage_sessions",
                json!({"action": "restore", "session_id": "does-not-exist"}),
            )
            .await
            .unwrap();
        assert_eq!(value["success"], false);
        assert!(value["error"].as_str().unwrap().contains("does-not-exist"));

        let value = tools
            .call("manage_sessions", json!({"action": "restore"}))
            .await
            .unwrap();
        assert_eq!(value["success"], false);
    }

    #[tokio::test]
    async fn test_list_restore_and_cleanup_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let (tools, store) = tools(&temp_dir, BackendOutcome::Cancelled);
        let id = store
            .create_persistent_session(Path::new("/srv/app"), "Ported the module")
            .await
            .unwrap();

        let listed = tools.call("manage_sessions", json!({})).await.unwrap();
        assert_eq!(listed["success"], true);
        assert_eq!(listed["active_sessions"], 1);
        assert_eq!(listed["sessions"][0]["session_id"], id.to_string());
        assert_eq!(listed["sessions"][0]["has_feedback"], false);

        let restored = tools
            .call(
                "manage_sessions",
                json!({"action": "restore", "session_id": id.to_string()}),
            )
            .await
            .unwrap();
        assert_eq!(restored["success"], true);
        assert_eq!(restored["summary"], "Ported the module");
        assert_eq!(restored["status"], "waiting_feedback");

        let cleaned = tools
            .call("manage_sessions", json!({"action": "cleanup", "max_age_hours": 0}))
            .await
            .unwrap();
        assert_eq!(cleaned["removed"], 1);
        assert_eq!(cleaned["max_age_hours"], 0);

        let unknown = tools
            .call("manage_sessions", json!({"action": "archive"}))
            .await
            .unwrap();
        assert_eq!(unknown["success"], false);
    }

    #[tokio::test]
    async fn test_system_info_reports_remote_environment() {
        let temp_dir = TempDir::new().unwrap();
        let (tools, _) = tools(&temp_dir, BackendOutcome::Cancelled);

        let info = tools.call("get_system_info", json!({})).await.unwrap();
        assert_eq!(info["is_remote"], true);
        assert_eq!(info["gui_capable"], false);
        assert_eq!(info["recommended_interface"], "web");
        assert_eq!(info["active_session_count"], 0);
        assert_eq!(info["persistent_mode"], false);
    }

    #[tokio::test]
    async fn test_optimize_performance_actions() {
        let temp_dir = TempDir::new().unwrap();
        let (tools, _) = tools(&temp_dir, BackendOutcome::Cancelled);

        let status = tools.call("optimize_performance", Value::Null).await.unwrap();
        assert_eq!(status["action"], "status");
        assert_eq!(status["recommendations"].as_array().unwrap().len(), 1);

        let preload = tools
            .call("optimize_performance", json!({"action": "preload"}))
            .await
            .unwrap();
        assert_eq!(preload["status"]["gui_preloaded"], true);
        assert_eq!(preload["status"]["web_backend_ready"], true);

        let benchmark = tools
            .call("optimize_performance", json!({"action": "benchmark"}))
            .await
            .unwrap();
        assert_eq!(benchmark["environment"]["selected_interface"], "web");

        let cleared = tools
            .call("optimize_performance", json!({"action": "clear_cache"}))
            .await
            .unwrap();
        assert_eq!(cleared["cache_existed"], true);

        let unknown = tools
            .call("optimize_performance", json!({"action": "defrag"}))
            .await
            .unwrap();
        assert_eq!(unknown["success"], false);
    }

    #[test]
    fn test_stale_cache_recommendation() {
        let stats = PerformanceStats {
            gui_preloaded: true,
            web_backend_ready: true,
            cache_age_seconds: Some(STALE_CACHE_SECS + 1),
            cache_file: "cache.json".into(),
        };
        assert_eq!(recommendations(&stats).len(), 1);
    }
}

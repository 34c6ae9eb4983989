//! Desktop backend: delegates to an external helper program.
//!
//! The helper is invoked as
//! `<command> [args] --project-directory DIR --summary TEXT --timeout SECS --output FILE`
//! and writes a JSON feedback result to `FILE` before exiting with status 0.
//! Exiting 0 without writing anything means the user closed the window.
//! `<command> [args] --probe` must exit 0 when a window can be shown.

use super::{BackendOutcome, InterfaceBackend, LaunchRequest};
use crate::{FeedbackError, Result};
use async_trait::async_trait;
use feedback_types::{FeedbackResult, InterfaceKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct GuiBackend {
    command: PathBuf,
    args: Vec<String>,
}

impl GuiBackend {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Arguments passed before the request flags.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Resolve the helper on `PATH` when given as a bare name.
    fn resolve(&self) -> Option<PathBuf> {
        if self.command.components().count() > 1 {
            return self.command.is_file().then(|| self.command.clone());
        }
        let path = std::env::var_os("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join(&self.command))
            .find(|candidate| candidate.is_file())
    }

    fn command(&self, program: &Path) -> Command {
        let mut command = Command::new(program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn probe(&self) -> Result<()> {
        let program = self.resolve().ok_or_else(|| {
            FeedbackError::Backend(format!("GUI helper not found: {}", self.command.display()))
        })?;

        let mut command = self.command(&program);
        command.arg("--probe");
        let status = match tokio::time::timeout(PROBE_TIMEOUT, command.status()).await {
            Ok(status) => status?,
            Err(_) => return Err(FeedbackError::Backend("GUI probe timed out".into())),
        };

        if status.success() {
            Ok(())
        } else {
            Err(FeedbackError::Backend(format!(
                "GUI probe exited with {}",
                status.code().unwrap_or(-1)
            )))
        }
    }

    async fn run(&self, request: &LaunchRequest, output: &Path) -> Result<Option<FeedbackResult>> {
        let program = self.resolve().ok_or_else(|| {
            FeedbackError::Backend(format!("GUI helper not found: {}", self.command.display()))
        })?;

        let mut command = self.command(&program);
        command
            .arg("--project-directory")
            .arg(&request.project_directory)
            .arg("--summary")
            .arg(&request.summary)
            .arg("--timeout")
            .arg(request.timeout.as_secs().to_string())
            .arg("--output")
            .arg(output);

        let result = command.output().await?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(FeedbackError::Backend(format!(
                "GUI helper exited with {}: {}",
                result.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        match std::fs::read_to_string(output) {
            Ok(content) if !content.trim().is_empty() => Ok(Some(serde_json::from_str(&content)?)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl InterfaceBackend for GuiBackend {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::Gui
    }

    async fn is_available(&self) -> bool {
        match self.probe().await {
            Ok(()) => true,
            Err(e) => {
                debug!(target: "feedback::backend", "GUI unavailable: {}", e);
                false
            }
        }
    }

    async fn prepare(&self) -> Result<()> {
        self.probe().await
    }

    async fn launch(&self, request: LaunchRequest) -> BackendOutcome {
        let output = std::env::temp_dir().join(format!("feedback_gui_{}.json", Uuid::new_v4()));
        info!(
            target: "feedback::backend",
            "Launching GUI helper for {}",
            request.project_directory.display()
        );

        // Dropping the run future on timeout kills the helper.
        let outcome = match tokio::time::timeout(request.timeout, self.run(&request, &output)).await
        {
            Ok(Ok(Some(result))) => BackendOutcome::Submitted(result),
            Ok(Ok(None)) => BackendOutcome::Cancelled,
            Ok(Err(e)) => {
                warn!(target: "feedback::backend", "GUI helper failed: {}", e);
                BackendOutcome::Failed(e.to_string())
            }
            Err(_) => BackendOutcome::Timeout,
        };

        let _ = std::fs::remove_file(&output);
        outcome
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FAKE_HELPER: &str = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --probe) exit 0 ;;
    --output) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
case "$MODE" in
  submit) printf '%s' '{"interactive_feedback":"from the window","images":[{"name":"a.png","size":3,"data":[1,2,3]}]}' > "$out" ;;
  close) ;;
  fail) echo "display lost" >&2; exit 3 ;;
  hang) sleep 30 ;;
esac
"#;

    fn helper(dir: &TempDir, mode: &str) -> GuiBackend {
        let script = dir.path().join("helper.sh");
        std::fs::write(&script, format!("MODE={}\n{}", mode, FAKE_HELPER)).unwrap();
        GuiBackend::new("/bin/sh").with_args(vec![script.to_string_lossy().into_owned()])
    }

    fn request(timeout: Duration) -> LaunchRequest {
        LaunchRequest {
            project_directory: "/tmp/project".into(),
            summary: "Done".into(),
            timeout,
        }
    }

    #[tokio::test]
    async fn test_submitted_result_is_parsed() {
        let dir = TempDir::new().unwrap();
        let backend = helper(&dir, "submit");
        assert!(backend.is_available().await);

        match backend.launch(request(Duration::from_secs(10))).await {
            BackendOutcome::Submitted(result) => {
                assert_eq!(result.interactive_feedback.as_deref(), Some("from the window"));
                assert_eq!(result.images.len(), 1);
                assert_eq!(result.images[0].name, "a.png");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_window_is_cancelled() {
        let dir = TempDir::new().unwrap();
        let outcome = helper(&dir, "close").launch(request(Duration::from_secs(10))).await;
        assert_eq!(outcome, BackendOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let dir = TempDir::new().unwrap();
        match helper(&dir, "fail").launch(request(Duration::from_secs(10))).await {
            BackendOutcome::Failed(message) => assert!(message.contains("display lost")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hanging_helper_times_out() {
        let dir = TempDir::new().unwrap();
        let outcome = helper(&dir, "hang").launch(request(Duration::from_millis(200))).await;
        assert_eq!(outcome, BackendOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_missing_helper_is_unavailable() {
        let backend = GuiBackend::new("feedback-gui-that-does-not-exist");
        assert!(!backend.is_available().await);
        assert!(backend.prepare().await.is_err());
        assert_eq!(backend.kind(), InterfaceKind::Gui);
    }
}

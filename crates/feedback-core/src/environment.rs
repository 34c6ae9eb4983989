//! Runtime environment detection.
//!
//! Decides whether a desktop interface can be shown or the request has to go
//! through the web backend (SSH sessions, dev containers, headless hosts).

use feedback_types::InterfaceKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

const SSH_ENV_VARS: [&str; 3] = ["SSH_CONNECTION", "SSH_CLIENT", "SSH_TTY"];
const REMOTE_ENV_VARS: [&str; 2] = ["REMOTE_CONTAINERS", "CODESPACES"];
const DOCKER_MARKER: &str = "/.dockerenv";

/// Snapshot of the environment variables and markers detection looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSignals {
    pub platform: String,
    pub ssh_connection: Option<String>,
    pub ssh_client: Option<String>,
    pub ssh_tty: Option<String>,
    pub remote_containers: Option<String>,
    pub codespaces: Option<String>,
    pub display: Option<String>,
    pub wayland_display: Option<String>,
    pub session_name: Option<String>,
    pub vscode_injection: Option<String>,
    pub in_container: bool,
}

impl EnvironmentSignals {
    /// Read the current process environment.
    pub fn capture() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            platform: std::env::consts::OS.to_string(),
            ssh_connection: var(SSH_ENV_VARS[0]),
            ssh_client: var(SSH_ENV_VARS[1]),
            ssh_tty: var(SSH_ENV_VARS[2]),
            remote_containers: var(REMOTE_ENV_VARS[0]),
            codespaces: var(REMOTE_ENV_VARS[1]),
            display: var("DISPLAY"),
            wayland_display: var("WAYLAND_DISPLAY"),
            session_name: var("SESSIONNAME"),
            vscode_injection: var("VSCODE_INJECTION"),
            in_container: Path::new(DOCKER_MARKER).exists(),
        }
    }

    /// Stable hash of the signals, used as the detection cache key.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        // serde_json of a plain struct cannot fail
        hasher.update(serde_json::to_vec(self).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }

    /// Why this looks like a remote or headless context, if it does.
    pub fn remote_reason(&self) -> Option<&'static str> {
        if self.ssh_connection.is_some() || self.ssh_client.is_some() || self.ssh_tty.is_some() {
            return Some("ssh session");
        }
        if self.remote_containers.is_some() || self.codespaces.is_some() {
            return Some("remote development environment");
        }
        if self.in_container {
            return Some("container");
        }
        if self.platform == "windows"
            && self.session_name.as_deref().is_some_and(|s| s.contains("RDP"))
        {
            return Some("remote desktop");
        }
        if self.platform == "linux" && self.display.is_none() && self.wayland_display.is_none() {
            return Some("no display");
        }
        None
    }

    pub fn is_remote(&self) -> bool {
        self.remote_reason().is_some()
    }
}

/// Outcome of a full environment detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub is_remote: bool,
    pub gui_capable: bool,
}

impl Detection {
    /// Interface to use for this detection.
    pub fn interface(&self, force_web: bool) -> InterfaceKind {
        if force_web || self.is_remote || !self.gui_capable {
            InterfaceKind::Web
        } else {
            InterfaceKind::Gui
        }
    }
}

/// Run full detection. The GUI probe only runs for local contexts.
pub fn detect(signals: &EnvironmentSignals, gui_probe: impl FnOnce() -> bool) -> Detection {
    let reason = signals.remote_reason();
    let gui_capable = reason.is_none() && gui_probe();

    debug!(
        target: "feedback::environment",
        "Environment detected: remote={} ({}), gui_capable={}",
        reason.is_some(),
        reason.unwrap_or("local"),
        gui_capable
    );

    Detection {
        is_remote: reason.is_some(),
        gui_capable,
    }
}

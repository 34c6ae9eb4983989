//! Server configuration.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Holds the session database and the detection cache.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Desktop helper program, looked up on `PATH` when given as a bare name.
    #[serde(default = "default_gui_command")]
    pub gui_command: PathBuf,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Minimum wait for feedback in persistent mode.
    #[serde(default = "default_persistent_timeout")]
    pub persistent_timeout_secs: u64,
    #[serde(default = "default_persist_results")]
    pub persist_results: bool,
    /// Where collected results are written; the temp directory when unset.
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedback-bridge")
}

fn default_gui_command() -> PathBuf {
    PathBuf::from("feedback-gui")
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_persistent_timeout() -> u64 {
    24 * 60 * 60
}

fn default_persist_results() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            gui_command: default_gui_command(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            persistent_timeout_secs: default_persistent_timeout(),
            persist_results: default_persist_results(),
            results_dir: None,
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from config/default.toml or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }
        Ok(Config::default())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("sessions.db")
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn persistent_timeout(&self) -> Duration {
        Duration::from_secs(self.persistent_timeout_secs)
    }

    /// Address the web backend advertises for pending requests.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
port = 9100
gui_command = "/usr/local/bin/feedback-gui"
persist_results = false
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.gui_command, PathBuf::from("/usr/local/bin/feedback-gui"));
        assert!(!config.persist_results);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.persistent_timeout(), Duration::from_secs(86400));
        assert_eq!(config.base_url(), "http://127.0.0.1:9100");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}

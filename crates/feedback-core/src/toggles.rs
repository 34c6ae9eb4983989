//! Runtime behavior toggles.
//!
//! Toggles are read every time a request is handled, so flipping an
//! environment variable affects the next call without a restart.

/// Snapshot of the behavior toggles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toggles {
    /// Keep sessions alive across long waits (`MCP_PERSISTENT`).
    pub persistent: bool,
    /// Always use the web backend (`FORCE_WEB`).
    pub force_web: bool,
    /// Use cached detection and preloaded backends (`MCP_FAST_LAUNCH`).
    pub fast_launch: bool,
    pub debug: bool,
    /// Add full data URLs to the image summary (`INCLUDE_BASE64_DETAIL`).
    pub include_base64: bool,
    pub web_port: Option<u16>,
}

impl Toggles {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build toggles from any variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| lookup(name).is_some_and(|v| is_truthy(&v));
        Self {
            persistent: flag("MCP_PERSISTENT"),
            force_web: flag("FORCE_WEB"),
            fast_launch: flag("MCP_FAST_LAUNCH"),
            debug: flag("MCP_DEBUG"),
            include_base64: flag("INCLUDE_BASE64_DETAIL"),
            web_port: lookup("MCP_WEB_PORT").and_then(|v| v.trim().parse().ok()),
        }
    }
}

/// `true`, `1`, `yes` and `on`, in any case.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Where the orchestrator reads its toggles from.
pub trait ToggleSource: Send + Sync {
    fn read(&self) -> Toggles;
}

/// Reads the process environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvToggles;

impl ToggleSource for EnvToggles {
    fn read(&self) -> Toggles {
        Toggles::from_env()
    }
}

/// Fixed toggles.
impl ToggleSource for Toggles {
    fn read(&self) -> Toggles {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_truthy_values() {
        for value in ["true", "TRUE", "1", "yes", "On", " on "] {
            assert!(is_truthy(value), "{value} should be truthy");
        }
        for value in ["false", "0", "no", "off", "", "enabled"] {
            assert!(!is_truthy(value), "{value} should not be truthy");
        }
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("MCP_PERSISTENT", "yes"),
            ("FORCE_WEB", "0"),
            ("MCP_FAST_LAUNCH", "true"),
            ("INCLUDE_BASE64_DETAIL", "on"),
            ("MCP_WEB_PORT", "9000"),
        ]
        .into_iter()
        .collect();

        let toggles = Toggles::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(
            toggles,
            Toggles {
                persistent: true,
                force_web: false,
                fast_launch: true,
                debug: false,
                include_base64: true,
                web_port: Some(9000),
            }
        );
    }

    #[test]
    fn test_invalid_port_is_ignored() {
        let toggles = Toggles::from_lookup(|name| (name == "MCP_WEB_PORT").then(|| "http".to_string()));
        assert_eq!(toggles.web_port, None);
    }

    #[test]
    fn test_fixed_source() {
        let fixed = Toggles {
            force_web: true,
            ..Default::default()
        };
        assert!(fixed.read().force_web);
    }
}

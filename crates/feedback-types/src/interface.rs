//! Interface selection and tool descriptor types.

use serde::{Deserialize, Serialize};

/// Which front end presents a feedback request to the human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Web,
    Gui,
}

impl InterfaceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Gui => "gui",
        }
    }
}

impl std::fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared shape of an operation exposed to the agent host.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON Schema of the accepted arguments object.
    pub input_schema: serde_json::Value,
}

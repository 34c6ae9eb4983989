//! Shared types for the feedback bridge.

mod feedback;
mod interface;
mod session;

pub use feedback::*;
pub use interface::*;
pub use session::*;

use thiserror::Error;

/// A string did not name any known variant of an enum.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

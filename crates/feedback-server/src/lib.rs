//! HTTP front end for the feedback bridge.
//!
//! Serves the tool table to the agent host and the pending-request endpoints
//! the web interface answers through. Kept apart from main.rs so integration
//! tests can drive the router directly.

pub mod config;
pub mod logging;
pub mod routes;
pub mod state;

//! Feedback bridge server.

use anyhow::Result;
use clap::Parser;
use feedback_core::Toggles;
use feedback_server::{config, logging, routes, state};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use config::Config;
use logging::{LogConfig, LogFormat, Verbosity};
use state::AppState;

/// Collects interactive human feedback for AI agents.
#[derive(Parser, Debug)]
#[command(name = "feedback-server")]
#[command(about = "Serves feedback collection tools and the web feedback endpoints")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config and MCP_WEB_PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging (also enabled by MCP_DEBUG)
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "cache=debug").
    /// Can be repeated. Targets are prefixed with "feedback::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let toggles = Toggles::from_env();

    let verbosity = Verbosity::select(cli.quiet, cli.trace, cli.debug, toggles.debug);
    let log_config = LogConfig::new(verbosity, &cli.log_overrides, cli.log_format)?;
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // --port beats MCP_WEB_PORT beats the file
    if let Some(port) = cli.port.or(toggles.web_port) {
        config.port = port;
    }

    tracing::info!(
        target: "feedback::startup",
        "Loaded configuration (port: {}, data dir: {})",
        config.port,
        config.data_dir.display()
    );

    let state = Arc::new(AppState::new(config.clone())?);
    tracing::info!(target: "feedback::startup", "Initialized application state");

    if toggles.persistent {
        state.store.start_heartbeat().await?;
    }
    if toggles.fast_launch {
        state
            .orchestrator
            .cache()
            .enable_performance_optimizations()
            .await;
    }

    let app = routes::app(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "feedback::startup", "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.store.shutdown().await?;
    tracing::info!(target: "feedback::startup", "Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "feedback::startup", "Failed to listen for shutdown signal: {}", e);
    }
}

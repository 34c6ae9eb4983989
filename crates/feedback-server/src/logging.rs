//! Tracing subscriber setup.
//!
//! Components log under `feedback::<area>` targets. The server picks one
//! [`Verbosity`] from its flags and the `MCP_DEBUG` toggle, then layers any
//! `--log area=level` directives on top. A set `RUST_LOG` replaces all of it.

use anyhow::{Context, Result, bail};
use tracing_subscriber::{
    EnvFilter,
    filter::{Directive, LevelFilter},
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const ROOT_TARGET: &str = "feedback";

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// How much the server says.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    /// Request lifecycle at info, probing and encoding only when they fail.
    #[default]
    Normal,
    /// Everything except the heartbeat sweep.
    Debug,
    Trace,
}

impl Verbosity {
    /// `--quiet` beats `--trace` beats `--debug`; `MCP_DEBUG` counts as
    /// `--debug` when no flag was given.
    pub fn select(quiet: bool, trace: bool, debug: bool, debug_toggle: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if trace {
            Self::Trace
        } else if debug || debug_toggle {
            Self::Debug
        } else {
            Self::Normal
        }
    }

    fn directives(self) -> &'static [&'static str] {
        match self {
            Self::Quiet => &["feedback=warn", "tower_http=error"],
            Self::Normal => &[
                "feedback=info",
                "feedback::session::heartbeat=off",
                "feedback::cache=warn",
                "feedback::codec=warn",
                "feedback::environment=warn",
                "tower_http=warn",
            ],
            Self::Debug => &[
                "feedback=debug",
                "feedback::session::heartbeat=off",
                "tower_http=debug",
            ],
            Self::Trace => &["feedback=trace", "tower_http=trace"],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub verbosity: Verbosity,
    /// `target=level` directives applied after the verbosity ones, so they win.
    pub overrides: Vec<String>,
    pub format: LogFormat,
}

impl LogConfig {
    /// Build from `--log` values such as `cache=debug` or
    /// `session::heartbeat=trace,backend=info`. Bare areas are placed under
    /// `feedback::`.
    pub fn new(verbosity: Verbosity, overrides: &[String], format: LogFormat) -> Result<Self> {
        let overrides = overrides
            .iter()
            .flat_map(|arg| arg.split(','))
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(parse_override)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            verbosity,
            overrides,
            format,
        })
    }

    fn filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }

        self.verbosity
            .directives()
            .iter()
            .copied()
            .chain(self.overrides.iter().map(String::as_str))
            .filter_map(|d| d.parse::<Directive>().ok())
            .fold(EnvFilter::new("warn"), EnvFilter::add_directive)
    }
}

fn parse_override(part: &str) -> Result<String> {
    let Some((area, level)) = part.split_once('=') else {
        bail!("log override '{}' is not of the form area=level", part);
    };
    let area = area.trim();
    let level = level.trim().to_ascii_lowercase();
    level
        .parse::<LevelFilter>()
        .with_context(|| format!("unknown log level in '{}'", part))?;

    let target = if area == ROOT_TARGET
        || area.starts_with("feedback::")
        || area.starts_with("tower_http")
    {
        area.to_string()
    } else {
        format!("{}::{}", ROOT_TARGET, area)
    };

    let directive = format!("{}={}", target, level);
    directive
        .parse::<Directive>()
        .with_context(|| format!("invalid log override '{}'", part))?;
    Ok(directive)
}

/// Install the global subscriber.
pub fn init(config: &LogConfig) {
    let registry = tracing_subscriber::registry().with(config.filter());

    match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init(),
    }
}

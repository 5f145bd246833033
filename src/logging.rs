//! Structured logging for the `brrtgate` binary and for gateways that do not
//! install their own subscriber.
//!
//! The filter only emits `tracing` events. Rejections are logged at `error`,
//! fail-open admissions and verifier failures at `warn`, stage transitions at
//! `debug`. Tokens and claims are never logged.
//!
//! Output goes to stderr so `brrtgate` command output on stdout stays
//! machine-readable.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const ENV_LEVEL: &str = "BRRTGATE_LOG_LEVEL";
const ENV_FORMAT: &str = "BRRTGATE_LOG_FORMAT";
const ENV_ASYNC: &str = "BRRTGATE_LOG_ASYNC";
const ENV_TARGET_FILTER: &str = "BRRTGATE_LOG_TARGET_FILTER";
const ENV_INCLUDE_LOCATION: &str = "BRRTGATE_LOG_INCLUDE_LOCATION";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers
    #[default]
    Json,
    /// Multi-line human-readable output
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Write through a background thread (`tracing-appender`)
    pub non_blocking: bool,
    /// Extra directives such as `brrtgate::cache=debug`
    pub directives: Vec<String>,
    /// Include source file and line
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            non_blocking: true,
            directives: Vec::new(),
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Defaults overridden by `BRRTGATE_LOG_*`
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Override fields from `BRRTGATE_LOG_*`; unparsable values keep `self`'s.
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    #[must_use]
    pub fn with_overrides<F>(self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            level: lookup(ENV_LEVEL)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(self.level),
            format: lookup(ENV_FORMAT)
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.format),
            non_blocking: lookup(ENV_ASYNC)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(self.non_blocking),
            directives: match lookup(ENV_TARGET_FILTER) {
                Some(v) => v
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
                    .collect(),
                None => self.directives,
            },
            include_location: lookup(ENV_INCLUDE_LOCATION)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(self.include_location),
        }
    }

    /// Pretty, synchronous, warnings only: what `brrtgate` uses interactively
    pub fn quiet_cli() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Pretty,
            non_blocking: false,
            ..Self::default()
        }
    }

    /// `RUST_LOG` when set, else the configured level, plus the extra directives.
    /// Invalid directives are skipped.
    pub fn env_filter(&self) -> EnvFilter {
        let base = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()));
        self.directives
            .iter()
            .filter_map(|d| d.parse().ok())
            .fold(base, |filter, directive| filter.add_directive(directive))
    }

    fn layer<S>(&self, writer: BoxMakeWriter) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_file(self.include_location)
            .with_line_number(self.include_location);
        match self.format {
            LogFormat::Json => layer
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// With `non_blocking` the returned guard flushes pending events when
/// dropped; keep it alive until exit.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging_with_config(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let (writer, guard) = if config.non_blocking {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        (BoxMakeWriter::new(writer), Some(guard))
    } else {
        (BoxMakeWriter::new(std::io::stderr), None)
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(config.layer(writer))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

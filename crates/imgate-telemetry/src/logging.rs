//! Logging setup: a small builder over `tracing-subscriber`.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{TelemetryError, TelemetryResult};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colorized when the target is a TTY.
    Pretty,
    /// One JSON object per line, for ingestion by log collectors.
    Json,
    /// Single-line, no color.
    Compact,
}

/// Where log lines are written.
#[derive(Debug, Clone)]
pub enum LogTarget {
    /// Standard error.
    Stderr,
    /// A rolling daily file under the given directory, with the given
    /// file name prefix.
    File {
        /// Directory the rolling file appender writes into.
        directory: PathBuf,
        /// File name prefix (e.g. `"imgate-gateway"`).
        prefix: String,
    },
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    directive: String,
    format: LogFormat,
    target: LogTarget,
}

impl LogConfig {
    /// Start a config with the given base level directive (e.g. `"info"`).
    #[must_use]
    pub fn new(directive: impl Into<String>) -> Self {
        Self {
            directive: directive.into(),
            format: LogFormat::Pretty,
            target: LogTarget::Stderr,
        }
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Append an additional filter directive, e.g. `"imgate_router=debug"`.
    #[must_use]
    pub fn with_directive(mut self, directive: &str) -> Self {
        self.directive.push(',');
        self.directive.push_str(directive);
        self
    }

    /// Write logs to a rolling daily file instead of stderr.
    #[must_use]
    pub fn with_file_target(mut self, directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.target = LogTarget::File {
            directory: directory.into(),
            prefix: prefix.into(),
        };
        self
    }
}

/// Install the global `tracing` subscriber from the given config.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] if the directive string is
/// malformed, [`TelemetryError::AlreadyInitialized`] if a global
/// subscriber is already installed, or [`TelemetryError::LogFile`] if a
/// file target could not be opened.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = EnvFilter::try_new(&config.directive)
        .map_err(|e| TelemetryError::InvalidFilter(e.to_string()))?;

    match &config.target {
        LogTarget::Stderr => {
            let fmt_layer = fmt::layer().with_writer(std::io::stderr);
            install(filter, fmt_layer, config.format)
        }
        LogTarget::File { directory, prefix } => {
            std::fs::create_dir_all(directory).map_err(|e| TelemetryError::LogFile {
                path: directory.display().to_string(),
                source: e,
            })?;
            let appender = tracing_appender::rolling::daily(directory, prefix);
            let fmt_layer = fmt::layer().with_writer(appender).with_ansi(false);
            install(filter, fmt_layer, config.format)
        }
    }
}

fn install<W>(
    filter: EnvFilter,
    fmt_layer: fmt::Layer<tracing_subscriber::Registry, fmt::format::DefaultFields, fmt::format::Format, W>,
    format: LogFormat,
) -> TelemetryResult<()>
where
    W: for<'writer> fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry.with(fmt_layer.pretty()).try_init(),
        LogFormat::Json => registry.with(fmt_layer.json()).try_init(),
        LogFormat::Compact => registry.with(fmt_layer.compact()).try_init(),
    };
    result.map_err(|_| TelemetryError::AlreadyInitialized)
}

/// Install logging with sane defaults (`info` level, pretty format, stderr),
/// for use by tests and quick starts.
///
/// # Errors
///
/// See [`setup_logging`].
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::new("info"))
}

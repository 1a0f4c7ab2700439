//! # Structured Logging
//!
//! The rate-control core only emits `tracing` events; binaries, demos and
//! benchmarks choose how they are rendered by calling [`init_logging`].
//!
//! ```rust,ignore
//! use r4w_minstrel::observe::{init_logging, LogConfig, LogFormat, LogLevel};
//!
//! init_logging(&LogConfig {
//!     level: LogLevel::Debug,
//!     format: LogFormat::Compact,
//!     filter: Some("r4w_minstrel::station=trace".into()),
//!     ..Default::default()
//! });
//! ```

use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Every statistics pass and sampling decision
    Trace,
    /// Retry ladder steps and best-rate changes
    Debug,
    /// Station lifecycle
    #[default]
    Info,
    /// Warning level
    Warn,
    /// Error level
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines (machine-readable)
    Json,
    /// Multi-line, human-readable
    #[default]
    Pretty,
    /// One line per event
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level used when neither `filter` nor `RUST_LOG` is set
    pub level: LogLevel,
    /// Output format
    pub format: LogFormat,
    /// Include timestamps
    pub timestamps: bool,
    /// Include source location (file:line)
    pub source_location: bool,
    /// Include span enter/exit events
    pub span_events: bool,
    /// Directive filter (e.g. "r4w_minstrel=debug"), overrides `RUST_LOG`
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            timestamps: true,
            source_location: false,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Verbose, pretty output with source locations.
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            source_location: true,
            span_events: true,
            ..Default::default()
        }
    }

    /// JSON output at info level.
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            ..Default::default()
        }
    }

    /// Errors only, compact, no timestamps.
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            timestamps: false,
            ..Default::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string());
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }

    fn fmt_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let span_events = if self.span_events {
            fmt::format::FmtSpan::FULL
        } else {
            fmt::format::FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_file(self.source_location)
            .with_line_number(self.source_location)
            .with_span_events(span_events);

        match (self.format, self.timestamps) {
            (LogFormat::Json, true) => base.json().boxed(),
            (LogFormat::Json, false) => base.json().without_time().boxed(),
            (LogFormat::Pretty, true) => base.pretty().boxed(),
            (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (LogFormat::Compact, true) => base.compact().boxed(),
            (LogFormat::Compact, false) => base.compact().without_time().boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed; the existing one
/// stays in place.
pub fn init_logging(config: &LogConfig) -> bool {
    let subscriber = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(config.fmt_layer());
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

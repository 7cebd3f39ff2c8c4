//! Tracing subscriber installation
//!
//! Library code only emits `tracing` events. Applications call [`init`] once
//! to route them either to the console or to a callback of their own.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

use crate::settings::LoggingSettings;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Logging is already initialized: {0}")]
    AlreadyInitialized(String),

    #[error("Unknown log level '{0}'")]
    UnknownLevel(String),
}

/// Severity threshold. `Critical` selects the same events as `Error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
    Off,
}

impl LogLevel {
    pub fn filter(&self) -> LevelFilter {
        match self {
            Self::Trace => LevelFilter::TRACE,
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warn => LevelFilter::WARN,
            Self::Error | Self::Critical => LevelFilter::ERROR,
            Self::Off => LevelFilter::OFF,
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            "off" => Ok(Self::Off),
            _ => Err(LoggingError::UnknownLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Off => "off",
        };
        f.write_str(text)
    }
}

/// Console layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// One event as delivered to a log callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
    /// Structured fields other than the message, in emission order
    pub fields: Vec<(String, String)>,
}

pub type LogCallback = Arc<dyn Fn(&LogRecord) + Send + Sync>;

/// Collects an event's message and fields
#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push((field.name().to_string(), format!("{:?}", value)));
        }
    }
}

/// Layer forwarding every enabled event to a [`LogCallback`]
pub struct CallbackLayer {
    callback: LogCallback,
}

impl CallbackLayer {
    pub fn new(callback: LogCallback) -> Self {
        Self { callback }
    }
}

impl<S: Subscriber> Layer<S> for CallbackLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let metadata = event.metadata();
        let record = LogRecord {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            file: metadata.file().map(str::to_string),
            line: metadata.line(),
            message: collector.message,
            fields: collector.fields,
        };
        (self.callback)(&record);
    }
}

fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.filter().into())
        .from_env_lossy()
}

/// Install the global subscriber.
///
/// `RUST_LOG` directives refine the configured level. With a callback, events
/// go only to the callback; otherwise they are printed to stdout. Fails if a
/// global subscriber already exists.
pub fn init(settings: &LoggingSettings, callback: Option<LogCallback>) -> Result<(), LoggingError> {
    let console = callback.is_none();
    let full = (console && settings.format == LogFormat::Full)
        .then(|| tracing_subscriber::fmt::layer().with_target(true));
    let compact = (console && settings.format == LogFormat::Compact)
        .then(|| tracing_subscriber::fmt::layer().compact().with_target(false));

    tracing_subscriber::registry()
        .with(env_filter(settings.level))
        .with(full)
        .with(compact)
        .with(callback.map(CallbackLayer::new))
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

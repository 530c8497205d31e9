//! Logging infrastructure - structured tracing for the embedding layer
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Levels and format taken from the host config, overridable from the environment
//! - Console output on stderr or a daily-rolling file
//! - Idempotent initialization; the first caller owns the appender guard
//!
//! Modules log through the macros re-exported here.

use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub use tracing::{debug, error, info, trace, warn};

use crate::config::LoggingConfig;

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// Structured JSON lines
    Json,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    pub format: LogFormat,
    /// Log file (rotated daily); stderr when unset
    pub file: Option<PathBuf>,
    /// Show span events (new/close)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            file: None,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Start from the `[logging]` section of a host config
    pub fn from_settings(settings: &LoggingConfig) -> Self {
        Self {
            level: parse_level(&settings.level),
            format: settings.format,
            file: settings.file.clone(),
            show_spans: false,
        }
    }

    /// Let `LUABRIDGE_LOG_*` variables override the current values
    pub fn apply_env(mut self) -> Self {
        // LUABRIDGE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("LUABRIDGE_LOG_LEVEL") {
            self.level = parse_level(&level);
        }

        // LUABRIDGE_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("LUABRIDGE_LOG_FILE") {
            self.file = Some(PathBuf::from(path));
        }

        // LUABRIDGE_LOG_JSON: switch to JSON lines
        if std::env::var("LUABRIDGE_LOG_JSON").is_ok() {
            self.format = LogFormat::Json;
        }

        // LUABRIDGE_LOG_SPANS: show span events
        if std::env::var("LUABRIDGE_LOG_SPANS").is_ok() {
            self.show_spans = true;
        }

        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Unknown names fall back to `INFO`
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() -> Option<WorkerGuard> {
    init_with_config(LogConfig::from_env())
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber and receives the guard; keep it
/// alive until exit so buffered lines are flushed.
pub fn init_with_config(config: LogConfig) -> Option<WorkerGuard> {
    let mut guard = None;
    LOGGER_INITIALIZED.get_or_init(|| {
        let (writer, worker) = match &config.file {
            Some(path) => {
                let (directory, prefix) = split_log_path(path);
                tracing_appender::non_blocking(rolling::daily(directory, prefix))
            }
            None => tracing_appender::non_blocking(io::stderr()),
        };
        guard = Some(worker);

        let span_events = if config.show_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_writer(writer)
                .pretty()
                .with_span_events(span_events)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .with_writer(writer)
                .compact()
                .with_span_events(span_events)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .with_writer(writer)
                .json()
                .with_span_events(span_events)
                .boxed(),
        };

        // Another subscriber may already be installed (tests, embedding apps)
        let _ = tracing_subscriber::registry()
            .with(build_filter(&config))
            .with(layer)
            .try_init();
    });
    guard
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("luabridge={}", config.level.as_str().to_lowercase()))
    })
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let prefix = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("luabridge.log"));
    (directory, prefix)
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(config.file.is_none());

        let config = LogConfig::default()
            .with_level(Level::TRACE)
            .with_format(LogFormat::Json)
            .with_file("logs/bridge.log");
        assert_eq!(config.level, Level::TRACE);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("logs/bridge.log")));
    }

    #[test]
    fn test_from_settings() {
        let settings = LoggingConfig {
            level: "debug".into(),
            format: LogFormat::Compact,
            file: None,
        };
        let config = LogConfig::from_settings(&settings);
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Compact);
    }

    #[test]
    fn test_parse_level_fallback() {
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("loud"), Level::INFO);
    }

    #[test]
    fn test_split_log_path() {
        let (dir, prefix) = split_log_path(Path::new("logs/bridge.log"));
        assert_eq!(dir, PathBuf::from("logs"));
        assert_eq!(prefix, "bridge.log");

        let (dir, prefix) = split_log_path(Path::new("bridge.log"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(prefix, "bridge.log");
    }

    #[test]
    fn test_init_idempotent() {
        let _guard = init_with_config(LogConfig::default().with_level(Level::ERROR));
        assert!(init().is_none());
        assert!(is_initialized());
    }
}

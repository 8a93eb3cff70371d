//! Structured logging for cyclecast
//!
//! Console output in pretty, compact or JSON form, plus optional JSON file
//! output with daily rotation. `RUST_LOG` overrides the configured level.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: LogLevel,

    /// Output format (pretty, json, compact)
    pub format: LogFormat,

    /// Log file path (None for console only)
    pub file_path: Option<PathBuf>,

    /// Rotate the log file daily
    pub rotation: bool,

    /// Include span enter/close events
    pub include_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            file_path: None,
            rotation: true,
            include_spans: false,
        }
    }
}

impl LogConfig {
    /// Raise the level by CLI verbosity count; never lowers the configured level
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        let requested = match verbose {
            0 => self.level,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        };
        self.level = self.level.max(requested);
        self
    }
}

/// Log level enum, ordered from least to most verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }

    pub fn to_filter(&self) -> String {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
        .to_string()
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format with colors
    Pretty,
    /// JSON format for log shipping
    Json,
    /// Single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// Initialize the logging system. Console output goes to stderr so that
/// `--json` command output on stdout stays machine-readable.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cyclecast={}", config.level.to_filter())));

    let span_events = if config.include_spans {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let console_layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(config.include_spans)
            .with_span_list(config.include_spans)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer);

    if let Some(file_path) = &config.file_path {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if config.rotation {
            let file_appender = tracing_appender::rolling::daily(
                file_path.parent().unwrap_or_else(|| Path::new(".")),
                file_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("cyclecast.log"),
            );

            let file_layer = fmt::layer()
                .json()
                .with_writer(file_appender)
                .with_target(true)
                .with_current_span(config.include_spans)
                .with_span_list(config.include_spans);

            subscriber.with(file_layer).try_init()?;
        } else {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)?;

            let file_layer = fmt::layer()
                .json()
                .with_writer(file)
                .with_target(true)
                .with_current_span(config.include_spans)
                .with_span_list(config.include_spans);

            subscriber.with(file_layer).try_init()?;
        }
    } else {
        subscriber.try_init()?;
    }

    tracing::debug!(
        level = ?config.level,
        format = ?config.format,
        file = ?config.file_path,
        "Logging initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Debug.to_tracing_level(), Level::DEBUG);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn test_verbosity_overrides_level() {
        let config = LogConfig::default();
        assert_eq!(config.clone().with_verbosity(0).level, LogLevel::Warn);
        assert_eq!(config.clone().with_verbosity(1).level, LogLevel::Info);
        assert_eq!(config.clone().with_verbosity(2).level, LogLevel::Debug);
        assert_eq!(config.with_verbosity(9).level, LogLevel::Trace);
    }

    #[test]
    fn test_verbosity_keeps_more_verbose_config() {
        let config = LogConfig {
            level: LogLevel::Debug,
            ..LogConfig::default()
        };
        assert_eq!(config.clone().with_verbosity(1).level, LogLevel::Debug);
        assert_eq!(config.with_verbosity(3).level, LogLevel::Trace);
    }
}

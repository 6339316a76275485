//! # Structured Logging
//!
//! `tracing` subscriber setup for the link core. Every component logs through
//! the `tracing` macros with key/value fields; this module only decides
//! where those events go and how they look.
//!
//! - JSON, pretty or compact output
//! - `RUST_LOG` wins over the configured level when set
//! - an explicit `filter` string wins over both
//!
//! ## Example
//!
//! ```rust,no_run
//! use ofdm_link_core::observe::{init_logging, LogConfig, LogFormat, LogLevel};
//!
//! let config = LogConfig {
//!     level: LogLevel::Debug,
//!     format: LogFormat::Json,
//!     ..Default::default()
//! };
//! init_logging(&config);
//!
//! tracing::info!(frames = 12, "link up");
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::{prelude::*, EnvFilter, Layer};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-frame builds and held decisions
    Trace,
    /// Dropped headers and feedback bursts
    Debug,
    /// MCS steps and starvation stops
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Multi-line, human readable
    #[default]
    Pretty,
    /// One line per event
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include file:line of the event
    pub source_location: bool,
    pub thread_ids: bool,
    pub thread_names: bool,
    /// Emit span enter/exit events
    pub span_events: bool,
    /// Directive string, e.g. `ofdm_link_core::decision=debug,warn`
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            source_location: false,
            thread_ids: false,
            thread_names: false,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Debug level with source locations and thread names.
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            source_location: true,
            thread_names: true,
            ..Default::default()
        }
    }

    /// JSON at info.
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            ..Default::default()
        }
    }

    /// Filter directives this config resolves to, ignoring `RUST_LOG`.
    pub fn directives(&self) -> String {
        match &self.filter {
            Some(custom) if EnvFilter::try_new(custom).is_ok() => custom.clone(),
            _ => self.level.to_string(),
        }
    }
}

/// Install the global subscriber.
///
/// Call once at startup. Returns `false` if a subscriber was already
/// installed, in which case the call has no effect.
pub fn init_logging(config: &LogConfig) -> bool {
    // An explicit filter string beats RUST_LOG; RUST_LOG beats the level
    let filter = match config.filter {
        Some(_) => EnvFilter::new(config.directives()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives())),
    };
    let span_events = if config.span_events {
        FmtSpan::FULL
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_thread_ids(config.thread_ids)
        .with_thread_names(config.thread_names)
        .with_span_events(span_events);
    let output = match config.format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(filter).with(output))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names_are_filter_directives() {
        for level in [LogLevel::Trace, LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            assert!(EnvFilter::try_new(level.to_string()).is_ok(), "{}", level);
        }
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn test_config_presets() {
        let dev = LogConfig::development();
        assert_eq!(dev.level, LogLevel::Debug);
        assert!(dev.source_location);

        let prod = LogConfig::production();
        assert_eq!(prod.format, LogFormat::Json);
        assert_eq!(prod.level, LogLevel::Info);
    }

    #[test]
    fn test_directives() {
        let mut config = LogConfig::default();
        assert_eq!(config.directives(), "info");

        config.filter = Some("ofdm_link_core::decision=debug,warn".into());
        assert_eq!(config.directives(), "ofdm_link_core::decision=debug,warn");

        config.filter = Some("[[[".into());
        config.level = LogLevel::Error;
        assert_eq!(config.directives(), "error");
    }

    #[test]
    fn test_parse_partial() {
        let config: LogConfig = serde_yaml::from_str("level: debug\nformat: compact\n").unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(!config.thread_ids);
    }
}

//! Tracing setup for Threadcast binaries
//!
//! A single subscriber writes to stderr in the chosen [`LogFormat`]. When
//! `RUST_LOG` is set it replaces the configured level entirely, so one
//! module can be turned up on its own:
//!
//! ```text
//! RUST_LOG=info,libthreadcast::poster=debug threadcast-server
//! ```
//!
//! ```no_run
//! use libthreadcast::logging::{LogFormat, LoggingConfig};
//!
//! # fn main() -> libthreadcast::Result<()> {
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false).init()?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain single-line records without colors
    Text,
    /// One JSON object per record, with the current span's fields
    Json,
    /// Multi-line colored records for local development
    Pretty,
}

impl LogFormat {
    pub const ALL: [LogFormat; 3] = [LogFormat::Text, LogFormat::Json, LogFormat::Pretty];

    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown log format '{}', expected one of: text, json, pretty",
                    s
                )
            })
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info`
    pub level: String,
    /// Forces the `debug` level
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(LogFormat::Text, "info".to_string(), false)
    }
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    fn directive(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }

    fn filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(self.directive()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "log level".to_string(),
                reason: format!("'{}': {}", self.directive(), e),
            }
            .into()
        })
    }

    /// Install the global subscriber
    ///
    /// Fails on an invalid level directive or when a subscriber is already
    /// installed.
    pub fn init(&self) -> Result<()> {
        let filter = self.filter()?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);

        let installed = match self.format {
            LogFormat::Text => builder.with_ansi(false).with_target(false).try_init(),
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .try_init(),
            LogFormat::Pretty => builder.pretty().with_line_number(true).try_init(),
        };

        installed.map_err(|e| {
            ConfigError::InvalidValue {
                field: "logging".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

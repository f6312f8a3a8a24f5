//! Agent log verbosity.
//!
//! Accepts the usual `tracing` level names plus the agent's own aliases:
//! `finest` and `all` are treated as `trace`, `verbose` as `debug`.
//!
//! # Parsing
//!
//! Names are case-insensitive and surrounding whitespace is ignored. When
//! deserializing, an unknown name or a non-string value falls back to
//! [`LogLevel::Warn`] and logs an error instead of failing the whole config.
//!
//! # Example
//!
//! ```
//! use newrelic_agent_core::config::log_level::LogLevel;
//! use tracing_subscriber::filter::LevelFilter;
//!
//! let level: LogLevel = "Finest".parse().unwrap();
//! assert_eq!(level, LogLevel::Trace);
//! assert_eq!(level.as_level_filter(), LevelFilter::TRACE);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Logging disabled.
    Off,
    Error,
    /// The default level.
    #[default]
    Warn,
    Info,
    Debug,
    /// Every segment, header and payload decision.
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    #[must_use]
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "verbose" => Ok(LogLevel::Debug),
            "trace" | "finest" | "all" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Invalid log level: '{s}'. Valid levels are: off, error, warn, info, debug, trace"
            )),
        }
    }
}

/// Never fails: an unknown value is logged and replaced with the default.
impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if let Value::String(s) = value {
            match LogLevel::from_str(&s) {
                Ok(level) => Ok(level),
                Err(e) => {
                    error!("{}", e);
                    Ok(LogLevel::default())
                }
            }
        } else {
            error!("Expected a string for log level, got {:?}", value);
            Ok(LogLevel::default())
        }
    }
}

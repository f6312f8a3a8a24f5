//! Agent log formatting.
//!
//! Every line is prefixed with `NR_AGENT` so agent output can be separated from
//! the host application's own logs.
//!
//! # Format
//!
//! ```text
//! NR_AGENT | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! # Examples
//!
//! ```text
//! NR_AGENT | DEBUG | accept_payload{transport="http"}: Ignoring distributed trace payload: Untrusted payload with trust key 99
//! NR_AGENT | DEBUG | Dropped 3 segment(s) not reachable from any root segment
//! NR_AGENT | ERROR | Invalid log level: 'loud'. Valid levels are: off, error, warn, info, debug, trace
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use newrelic_agent_core::config::get_config;
//! use newrelic_agent_core::logger;
//!
//! let config = get_config();
//! logger::init(config.log_level)?;
//! ```
//!
//! Setting `NEW_RELIC_LOG` to an `EnvFilter` directive such as
//! `newrelic_agent_core::segments=trace` overrides the configured level.
//!
//! # Span Context
//!
//! Active spans are written outermost first, each followed by its fields in
//! curly braces `{field=value}`.

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::log_level::LogLevel;

/// Environment variable holding a full `EnvFilter` directive that overrides
/// the configured level, e.g. `newrelic_agent_core::segments=trace`.
pub const LOG_FILTER_ENV: &str = "NEW_RELIC_LOG";

pub const LOG_PREFIX: &str = "NR_AGENT";

/// Formats events as `NR_AGENT | LEVEL | spans: message fields`.
///
/// Levels are upper-cased. No timestamp is written.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "{LOG_PREFIX} | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to install log subscriber: {0}")]
pub struct LoggerInitError(String);

/// Builds the filter for `level`, letting [`LOG_FILTER_ENV`] take precedence.
#[must_use]
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(level: LogLevel) -> Result<(), LoggerInitError> {
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .event_format(Formatter)
        .with_env_filter(env_filter(level))
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggerInitError(e.to_string()))
}

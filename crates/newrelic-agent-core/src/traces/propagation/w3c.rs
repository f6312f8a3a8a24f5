//! Outbound W3C trace context headers.
//!
//! `traceparent: 00-{trace id}-{parent id}-{flags}`
//!
//! `tracestate: {trust key}@nr=0-{parent type}-{account}-{app}-{span id}-{transaction id}-{sampled}-{priority}-{timestamp}[,{other vendors}]`

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::traces::propagation::error::PayloadError;
use crate::traces::propagation::payload::DistributedTracingParentType;

pub const TRACEPARENT_KEY: &str = "traceparent";
pub const TRACESTATE_KEY: &str = "tracestate";

const TRACEPARENT_VERSION: &str = "00";
const TRACESTATE_VERSION: u8 = 0;
const TRACE_ID_LENGTH: usize = 32;

lazy_static! {
    static ref TRACEPARENT_REGEX: Regex =
        Regex::new(r"^([a-f0-9]{2})-([a-f0-9]{32})-([a-f0-9]{16})-([a-f0-9]{2})$")
            .expect("failed creating regex");
    static ref INVALID_SEGMENT_REGEX: Regex = Regex::new(r"^0+$").expect("failed creating regex");
}

/// Lowercases and left-pads a trace id to 32 hex characters.
#[must_use]
pub fn format_trace_id(trace_id: &str) -> String {
    format!(
        "{:0>width$}",
        trace_id.to_lowercase(),
        width = TRACE_ID_LENGTH
    )
}

/// Up to six decimals, trailing zeros dropped: `0.1234567` is `0.123457`, `1.0` is `1`.
#[must_use]
pub fn format_priority(priority: f32) -> String {
    let formatted = format!("{priority:.6}");
    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceParent {
    pub trace_id: String,
    pub parent_id: String,
    pub sampled: bool,
}

impl TraceParent {
    /// Builds the header value, failing when the ids cannot form a valid header.
    pub fn header_value(&self) -> Result<String, PayloadError> {
        let trace_id = format_trace_id(&self.trace_id);
        let flags = if self.sampled { "01" } else { "00" };
        let value = format!("{TRACEPARENT_VERSION}-{trace_id}-{}-{flags}", self.parent_id);

        let captures = TRACEPARENT_REGEX
            .captures(&value)
            .ok_or(PayloadError::InvalidOutgoing("traceparent is not well formed"))?;
        let all_zero = |index: usize| {
            captures
                .get(index)
                .is_some_and(|segment| INVALID_SEGMENT_REGEX.is_match(segment.as_str()))
        };
        if all_zero(2) || all_zero(3) {
            return Err(PayloadError::InvalidOutgoing(
                "traceparent has an all-zero trace or parent id",
            ));
        }
        Ok(value)
    }
}

/// The New Relic entry of the `tracestate` header.
#[derive(Clone, Debug, PartialEq)]
pub struct NewRelicTraceState {
    pub trust_key: String,
    pub parent_type: DistributedTracingParentType,
    pub account_id: String,
    pub app_id: String,
    pub span_id: Option<String>,
    pub transaction_id: Option<String>,
    pub sampled: bool,
    pub priority: f32,
    pub timestamp: DateTime<Utc>,
}

impl NewRelicTraceState {
    /// The entry followed by other vendors' entries, comma separated.
    #[must_use]
    pub fn header_value(&self, vendor_state_entries: &[String]) -> String {
        let entry = format!(
            "{}@nr={TRACESTATE_VERSION}-{}-{}-{}-{}-{}-{}-{}-{}",
            self.trust_key,
            self.parent_type.tracestate_code(),
            self.account_id,
            self.app_id,
            self.span_id.as_deref().unwrap_or_default(),
            self.transaction_id.as_deref().unwrap_or_default(),
            u8::from(self.sampled),
            format_priority(self.priority),
            self.timestamp.timestamp_millis(),
        );

        let others: Vec<&str> = vendor_state_entries
            .iter()
            .map(|entry| entry.trim())
            .filter(|entry| !entry.is_empty())
            .collect();
        if others.is_empty() {
            entry
        } else {
            format!("{entry},{}", others.join(","))
        }
    }
}

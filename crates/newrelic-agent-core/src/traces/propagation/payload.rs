//! The `newrelic` distributed trace payload.
//!
//! On the wire the payload is a compact JSON object with short keys, absent
//! optional fields omitted:
//!
//! ```json
//! {"v":[0,1],"d":{"ty":"App","ac":"33","ap":"5043","id":"27856f70d3d314b7",
//!  "tr":"3221bf09aa0bcf0d","tk":"99","pr":1.4,"sa":true,"ti":1529445826000,
//!  "tx":"6d1f0a3e7c2b9e41"}}
//! ```
//!
//! Only the major version is negotiated: payloads from a newer major version
//! are rejected before their body is looked at, any minor version is accepted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::traces::propagation::error::PayloadError;

pub const SUPPORTED_MAJOR_VERSION: i64 = 0;
pub const SUPPORTED_MINOR_VERSION: i64 = 1;

/// Kind of agent that created the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DistributedTracingParentType {
    #[default]
    App,
    Browser,
    Mobile,
    Unknown,
}

impl DistributedTracingParentType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DistributedTracingParentType::App => "App",
            DistributedTracingParentType::Browser => "Browser",
            DistributedTracingParentType::Mobile => "Mobile",
            DistributedTracingParentType::Unknown => "Unknown",
        }
    }

    /// Numeric form used in the New Relic `tracestate` entry.
    #[must_use]
    pub fn tracestate_code(self) -> u8 {
        match self {
            DistributedTracingParentType::App | DistributedTracingParentType::Unknown => 0,
            DistributedTracingParentType::Browser => 1,
            DistributedTracingParentType::Mobile => 2,
        }
    }
}

impl fmt::Display for DistributedTracingParentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributedTracingParentType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DistributedTracingParentType::from_wire(s))
    }
}

impl DistributedTracingParentType {
    fn from_wire(s: &str) -> Self {
        match s {
            "App" => DistributedTracingParentType::App,
            "Browser" => DistributedTracingParentType::Browser,
            "Mobile" => DistributedTracingParentType::Mobile,
            _ => DistributedTracingParentType::Unknown,
        }
    }
}

impl Serialize for DistributedTracingParentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DistributedTracingParentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(DistributedTracingParentType::from_wire(&s))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DistributedTracePayload {
    /// `[major, minor]`.
    pub version: [i64; 2],
    pub parent_type: DistributedTracingParentType,
    pub account_id: String,
    /// Sender's application on the wire; the receiving application once accepted.
    pub app_id: String,
    /// Span id of the calling segment.
    pub guid: Option<String>,
    pub trace_id: String,
    /// Omitted when it equals `account_id`.
    pub trust_key: Option<String>,
    pub priority: Option<f32>,
    pub sampled: Option<bool>,
    pub timestamp: DateTime<Utc>,
    pub transaction_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    v: [i64; 2],
    d: WireData,
}

#[derive(Serialize, Deserialize)]
struct WireData {
    ty: DistributedTracingParentType,
    ac: String,
    ap: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    tr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pr: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sa: Option<bool>,
    ti: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tx: Option<String>,
}

impl DistributedTracePayload {
    /// Assembles an outbound payload at the current version.
    ///
    /// A trust key equal to the account id is dropped and the timestamp is
    /// truncated to the millisecond precision carried on the wire.
    #[allow(clippy::too_many_arguments)]
    pub fn try_build_outgoing_payload(
        parent_type: DistributedTracingParentType,
        account_id: &str,
        app_id: &str,
        guid: Option<String>,
        trace_id: &str,
        trust_key: Option<String>,
        priority: Option<f32>,
        sampled: Option<bool>,
        timestamp: DateTime<Utc>,
        transaction_id: Option<String>,
    ) -> Result<Self, PayloadError> {
        if account_id.is_empty() {
            return Err(PayloadError::InvalidOutgoing("account id is empty"));
        }
        if app_id.is_empty() {
            return Err(PayloadError::InvalidOutgoing("application id is empty"));
        }
        if trace_id.is_empty() {
            return Err(PayloadError::InvalidOutgoing("trace id is empty"));
        }

        Ok(DistributedTracePayload {
            version: [SUPPORTED_MAJOR_VERSION, SUPPORTED_MINOR_VERSION],
            parent_type,
            account_id: account_id.to_string(),
            app_id: app_id.to_string(),
            guid,
            trace_id: trace_id.to_string(),
            trust_key: trust_key.filter(|key| key != account_id),
            priority,
            sampled,
            timestamp: Utc
                .timestamp_millis_opt(timestamp.timestamp_millis())
                .single()
                .unwrap_or(timestamp),
            transaction_id,
        })
    }

    /// Parses and validates the JSON text of an inbound payload.
    pub fn try_build_incoming_payload_from_json(json: &str) -> Result<Self, PayloadError> {
        if json.trim().is_empty() {
            return Err(PayloadError::Null);
        }

        let value: Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(PayloadError::Malformed("payload is not a JSON object"));
        }
        check_version(&value)?;

        let envelope: WireEnvelope = serde_json::from_value(value)?;
        let WireData {
            ty,
            ac,
            ap,
            id,
            tr,
            tk,
            pr,
            sa,
            ti,
            tx,
        } = envelope.d;

        Ok(DistributedTracePayload {
            version: envelope.v,
            parent_type: ty,
            account_id: ac,
            app_id: ap,
            guid: id,
            trace_id: tr,
            trust_key: tk,
            priority: pr,
            sampled: sa,
            timestamp: parse_timestamp(ti)?,
            transaction_id: tx,
        })
    }

    pub fn to_json(&self) -> Result<String, PayloadError> {
        let envelope = WireEnvelope {
            v: self.version,
            d: WireData {
                ty: self.parent_type,
                ac: self.account_id.clone(),
                ap: self.app_id.clone(),
                id: self.guid.clone(),
                tr: self.trace_id.clone(),
                tk: self.trust_key.clone(),
                pr: self.priority,
                sa: self.sampled,
                ti: self.timestamp.timestamp_millis(),
                tx: self.transaction_id.clone(),
            },
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// At least one of `guid` or `transaction_id` is needed to link the trace.
    #[must_use]
    pub fn is_traceable(&self) -> bool {
        self.guid.is_some() || self.transaction_id.is_some()
    }

    /// The key checked against the receiver's trusted account key.
    #[must_use]
    pub fn incoming_trust_key(&self) -> &str {
        self.trust_key.as_deref().unwrap_or(&self.account_id)
    }
}

fn check_version(value: &Value) -> Result<(), PayloadError> {
    let version = value.get("v").ok_or(PayloadError::MissingField("v"))?;
    let major = version
        .as_array()
        .and_then(|parts| parts.first())
        .and_then(Value::as_i64)
        .ok_or(PayloadError::Malformed("version is not an integer pair"))?;

    if major > SUPPORTED_MAJOR_VERSION {
        return Err(PayloadError::UnsupportedVersion {
            major,
            supported: SUPPORTED_MAJOR_VERSION,
        });
    }
    if value.get("d").is_none() {
        return Err(PayloadError::MissingField("d"));
    }
    Ok(())
}

fn parse_timestamp(millis: i64) -> Result<DateTime<Utc>, PayloadError> {
    if millis <= 0 || millis > Utc::now().timestamp_millis() {
        return Err(PayloadError::InvalidTimestamp(millis));
    }
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(PayloadError::InvalidTimestamp(millis))
}

//! Distributed trace propagation.
//!
//! Inbound: a `newrelic` header value is decoded ([`header_encoder`]),
//! validated ([`payload`]) and trust-checked by the [`handler`].
//!
//! Outbound: the [`handler`] assembles a payload from the current transaction
//! and configuration and writes it, together with the W3C `traceparent` and
//! `tracestate` headers ([`w3c`]), into a [`carrier`].

pub mod api_model;
pub mod carrier;
pub mod error;
pub mod handler;
pub mod header_encoder;
pub mod payload;
pub mod w3c;

pub use api_model::DistributedTraceApiModel;
pub use error::PayloadError;
pub use handler::DistributedTracePayloadHandler;
pub use payload::{DistributedTracePayload, DistributedTracingParentType};

/// Header (or message metadata key) carrying the encoded payload.
pub const NEWRELIC_HEADER_KEY: &str = "newrelic";

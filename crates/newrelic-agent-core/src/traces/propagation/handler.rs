use chrono::{DateTime, Utc};
use tracing::{debug, error, trace};

use crate::config::{Config, ConfigurationService};
use crate::health::AgentHealthReporter;
use crate::traces::context::{
    generate_guid, InboundAcceptError, SegmentSpan, TransactionContext,
};
use crate::traces::propagation::{
    api_model::DistributedTraceApiModel,
    carrier::{Extractor, Injector},
    error::PayloadError,
    header_encoder::{
        serialize_and_encode_distributed_trace_payload,
        try_decode_and_deserialize_distributed_trace_payload,
    },
    payload::{DistributedTracePayload, DistributedTracingParentType},
    w3c::{NewRelicTraceState, TraceParent, TRACEPARENT_KEY, TRACESTATE_KEY},
    NEWRELIC_HEADER_KEY,
};

/// Accepts inbound distributed trace payloads and creates outbound ones.
///
/// The handler holds no per-call state. Configuration is read from the
/// [`ConfigurationService`] on every call, so it follows runtime updates.
/// Malformed or untrusted input is never surfaced as an error: it is logged,
/// counted through the [`AgentHealthReporter`] and turned into `None` or
/// [`DistributedTraceApiModel::Empty`].
///
/// # Thread Safety
///
/// All methods take `&self`. With a [`SharedConfiguration`] and a
/// [`CountingHealthReporter`] one handler can be shared between request
/// threads behind an `Arc`.
///
/// # Supportability
///
/// Every outcome maps to one counter of [`crate::health`]:
///
/// - accepted payloads: `AcceptPayload/Success`
/// - empty headers: `AcceptPayload/Ignored/Null`
/// - newer major versions: `AcceptPayload/Ignored/MajorVersion`
/// - untrusted accounts: `AcceptPayload/Ignored/UntrustedAccount`
/// - a second accept on one transaction: `AcceptPayload/Ignored/Multiple`
/// - an accept after outbound headers were sent: `AcceptPayload/Ignored/CreateBeforeAccept`
/// - anything else that fails to decode: `AcceptPayload/ParseException`
///
/// Disabled distributed tracing records nothing.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
///
/// use newrelic_agent_core::config::Config;
/// use newrelic_agent_core::health::NoopHealthReporter;
/// use newrelic_agent_core::traces::context::{SegmentSpan, TransactionContext};
/// use newrelic_agent_core::traces::propagation::DistributedTracePayloadHandler;
///
/// let config = Config {
///     account_id: Some("33".to_string()),
///     primary_application_id: Some("5043".to_string()),
///     trusted_account_key: Some("33".to_string()),
///     ..Config::default()
/// };
/// let handler = DistributedTracePayloadHandler::new(config, NoopHealthReporter);
///
/// let mut upstream = TransactionContext::new("b85ff7ef7dc6fc2e", 1.5);
/// upstream.set_sampled(true);
/// let mut headers: HashMap<String, String> = HashMap::new();
/// handler.insert_distributed_trace_headers(
///     &upstream,
///     Some(&SegmentSpan::new("27856f70d3d314b7")),
///     &mut headers,
/// );
///
/// let mut downstream = TransactionContext::new("6d1f0a3e7c2b9e41", 0.2);
/// assert!(handler.accept_transaction_distributed_trace_headers(&mut downstream, &headers));
/// assert_eq!(downstream.trace_id(), "b85ff7ef7dc6fc2e");
/// assert_eq!(downstream.sampled(), Some(true));
/// ```
///
/// [`SharedConfiguration`]: crate::config::SharedConfiguration
/// [`CountingHealthReporter`]: crate::health::CountingHealthReporter
pub struct DistributedTracePayloadHandler<C, H> {
    configuration: C,
    health_reporter: H,
}

impl<C, H> DistributedTracePayloadHandler<C, H>
where
    C: ConfigurationService,
    H: AgentHealthReporter,
{
    pub fn new(configuration: C, health_reporter: H) -> Self {
        DistributedTracePayloadHandler {
            configuration,
            health_reporter,
        }
    }

    /// Reads the `newrelic` header from `carrier` and accepts it.
    ///
    /// A carrier without the header yields `None` and records nothing.
    pub fn accept_distributed_trace_headers(
        &self,
        carrier: &dyn Extractor,
    ) -> Option<DistributedTracePayload> {
        let Some(header) = carrier.get(NEWRELIC_HEADER_KEY) else {
            trace!("No {NEWRELIC_HEADER_KEY} header to accept");
            return None;
        };
        self.try_decode_inbound_serialized_distributed_trace_payload(header)
    }

    /// Accepts the `newrelic` header of `carrier` into `transaction`.
    ///
    /// A transaction accepts at most one inbound trace, and only before it
    /// has created outbound headers. Refusals are counted as
    /// `AcceptPayload/Ignored/Multiple` and
    /// `AcceptPayload/Ignored/CreateBeforeAccept`. Returns `true` when the
    /// transaction now continues the inbound trace.
    pub fn accept_transaction_distributed_trace_headers(
        &self,
        transaction: &mut TransactionContext,
        carrier: &dyn Extractor,
    ) -> bool {
        if !self.configuration.configuration().distributed_tracing_enabled {
            trace!("Distributed tracing is disabled, ignoring inbound headers");
            return false;
        }
        if let Err(e) = transaction.check_can_accept_inbound() {
            debug!("Ignoring distributed trace headers for transaction {}: {e}", transaction.guid());
            match e {
                InboundAcceptError::Multiple => {
                    self.health_reporter.on_accept_payload_ignored_multiple();
                }
                InboundAcceptError::CreateBeforeAccept => {
                    self.health_reporter
                        .on_accept_payload_ignored_create_before_accept();
                }
            }
            return false;
        }

        let Some(payload) = self.accept_distributed_trace_headers(carrier) else {
            return false;
        };
        transaction.accept_inbound_payload(&payload).is_ok()
    }

    /// Decodes, validates and trust-checks an inbound header value.
    ///
    /// On success the payload's `app_id` is replaced with this application's
    /// primary application id.
    pub fn try_decode_inbound_serialized_distributed_trace_payload(
        &self,
        serialized_payload: &str,
    ) -> Option<DistributedTracePayload> {
        let config = self.configuration.configuration();
        if !config.distributed_tracing_enabled {
            trace!("Distributed tracing is disabled, ignoring inbound payload");
            return None;
        }

        match Self::decode_and_validate(&config, serialized_payload) {
            Ok(payload) => {
                if config.payload_success_metrics_enabled {
                    self.health_reporter.on_accept_payload_success();
                }
                Some(payload)
            }
            Err(e) => {
                self.report_rejected_payload(&e);
                None
            }
        }
    }

    fn decode_and_validate(
        config: &Config,
        serialized_payload: &str,
    ) -> Result<DistributedTracePayload, PayloadError> {
        let mut payload = try_decode_and_deserialize_distributed_trace_payload(serialized_payload)?;

        if !payload.is_traceable() {
            return Err(PayloadError::NotTraceable);
        }

        let incoming_trust_key = payload.incoming_trust_key();
        if config.trusted_account_key.as_deref() != Some(incoming_trust_key) {
            return Err(PayloadError::Untrusted {
                trust_key: incoming_trust_key.to_string(),
            });
        }

        if let Some(app_id) = &config.primary_application_id {
            payload.app_id.clone_from(app_id);
        }
        Ok(payload)
    }

    fn report_rejected_payload(&self, e: &PayloadError) {
        match e {
            PayloadError::Null => {
                debug!("Ignoring empty distributed trace payload");
                self.health_reporter.on_accept_payload_ignored_null();
            }
            PayloadError::UnsupportedVersion { .. } => {
                debug!("Ignoring distributed trace payload: {e}");
                self.health_reporter
                    .on_accept_payload_ignored_major_version();
            }
            PayloadError::Untrusted { .. } => {
                debug!("Ignoring distributed trace payload: {e}");
                self.health_reporter
                    .on_accept_payload_ignored_untrusted_account();
            }
            _ => {
                debug!("Failed to accept distributed trace payload: {e}");
                self.health_reporter.on_accept_payload_parse_exception();
            }
        }
    }

    /// Builds the `newrelic` header for an outbound call made by `segment`.
    ///
    /// A non-empty model marks the transaction as having sent outbound trace
    /// headers, after which it no longer accepts an inbound trace.
    pub fn try_get_outbound_distributed_trace_api_model(
        &self,
        transaction: &TransactionContext,
        segment: Option<&SegmentSpan>,
    ) -> DistributedTraceApiModel {
        let config = self.configuration.configuration();
        self.outbound_api_model(&config, transaction, segment, Utc::now())
    }

    fn outbound_api_model(
        &self,
        config: &Config,
        transaction: &TransactionContext,
        segment: Option<&SegmentSpan>,
        timestamp: DateTime<Utc>,
    ) -> DistributedTraceApiModel {
        let encoded = Self::build_outbound_payload(config, transaction, segment, timestamp)
            .and_then(|payload| {
                payload
                    .map(|payload| serialize_and_encode_distributed_trace_payload(&payload))
                    .transpose()
            });

        match encoded {
            Ok(Some(encoded)) => {
                transaction.mark_outgoing_trace_headers();
                if config.payload_success_metrics_enabled {
                    self.health_reporter.on_create_payload_success();
                }
                DistributedTraceApiModel::Encoded(encoded)
            }
            Ok(None) => DistributedTraceApiModel::Empty,
            Err(e) => {
                error!("Failed to create distributed trace payload: {e}");
                self.health_reporter.on_create_payload_exception();
                DistributedTraceApiModel::Empty
            }
        }
    }

    /// `Ok(None)` when no payload should be sent.
    fn build_outbound_payload(
        config: &Config,
        transaction: &TransactionContext,
        segment: Option<&SegmentSpan>,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<DistributedTracePayload>, PayloadError> {
        if !config.distributed_tracing_enabled {
            trace!("Distributed tracing is disabled, not creating a payload");
            return Ok(None);
        }
        let Some((account_id, app_id)) = identity(config) else {
            debug!("Account or application id not yet known, not creating a payload");
            return Ok(None);
        };
        if !config.span_events_enabled && !config.transaction_events_enabled {
            trace!("Span and transaction events are both disabled, not creating a payload");
            return Ok(None);
        }
        let Some(sampled) = transaction.sampled() else {
            debug!(
                "Sampling decision pending for transaction {}, not creating a payload",
                transaction.guid()
            );
            return Ok(None);
        };

        let guid = if config.span_events_enabled && sampled {
            segment.map(|segment| segment.span_id().to_string())
        } else {
            None
        };
        let transaction_id = config
            .transaction_events_enabled
            .then(|| transaction.guid().to_string());

        DistributedTracePayload::try_build_outgoing_payload(
            DistributedTracingParentType::App,
            account_id,
            app_id,
            guid,
            transaction.trace_id(),
            config.trusted_account_key.clone(),
            Some(transaction.priority()),
            Some(sampled),
            timestamp,
            transaction_id,
        )
        .map(Some)
    }

    /// Writes `newrelic`, `traceparent` and `tracestate` into `carrier`.
    ///
    /// The `newrelic` header is skipped when `exclude_newrelic_header` is set.
    pub fn insert_distributed_trace_headers(
        &self,
        transaction: &TransactionContext,
        segment: Option<&SegmentSpan>,
        carrier: &mut dyn Injector,
    ) {
        let config = self.configuration.configuration();
        if !config.distributed_tracing_enabled {
            trace!("Distributed tracing is disabled, not inserting headers");
            return;
        }
        let timestamp = Utc::now();

        if !config.exclude_newrelic_header {
            let model = self.outbound_api_model(&config, transaction, segment, timestamp);
            if !model.is_empty() {
                carrier.set(NEWRELIC_HEADER_KEY, model.http_safe().to_string());
            }
        }

        match Self::build_trace_context_headers(&config, transaction, segment, timestamp) {
            Ok(Some((traceparent, tracestate))) => {
                carrier.set(TRACEPARENT_KEY, traceparent);
                carrier.set(TRACESTATE_KEY, tracestate);
                transaction.mark_outgoing_trace_headers();
                if config.payload_success_metrics_enabled {
                    self.health_reporter.on_trace_context_create_success();
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!("Failed to create trace context headers: {e}");
                self.health_reporter.on_trace_context_create_exception();
            }
        }
    }

    fn build_trace_context_headers(
        config: &Config,
        transaction: &TransactionContext,
        segment: Option<&SegmentSpan>,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<(String, String)>, PayloadError> {
        let Some((account_id, app_id)) = identity(config) else {
            debug!("Account or application id not yet known, not creating trace context");
            return Ok(None);
        };
        let Some(sampled) = transaction.sampled() else {
            debug!(
                "Sampling decision pending for transaction {}, not creating trace context",
                transaction.guid()
            );
            return Ok(None);
        };

        let span_id = if config.span_events_enabled {
            segment.map(|segment| segment.span_id().to_string())
        } else {
            None
        };

        let traceparent = TraceParent {
            trace_id: transaction.trace_id().to_string(),
            parent_id: span_id.clone().unwrap_or_else(generate_guid),
            sampled,
        }
        .header_value()?;

        let tracestate = NewRelicTraceState {
            trust_key: config
                .trusted_account_key
                .as_deref()
                .filter(|key| !key.trim().is_empty())
                .unwrap_or(account_id)
                .to_string(),
            parent_type: DistributedTracingParentType::App,
            account_id: account_id.to_string(),
            app_id: app_id.to_string(),
            span_id,
            transaction_id: config
                .transaction_events_enabled
                .then(|| transaction.guid().to_string()),
            sampled,
            priority: transaction.priority(),
            timestamp,
        }
        .header_value(transaction.vendor_state_entries());

        Ok(Some((traceparent, tracestate)))
    }
}

/// Account and application ids, when both are known and not blank.
fn identity(config: &Config) -> Option<(&str, &str)> {
    fn known(id: Option<&str>) -> Option<&str> {
        id.filter(|id| !id.trim().is_empty())
    }
    Some((
        known(config.account_id.as_deref())?,
        known(config.primary_application_id.as_deref())?,
    ))
}

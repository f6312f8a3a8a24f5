use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;

use crate::traces::propagation::payload::{DistributedTracePayload, DistributedTracingParentType};

/// A new 16 character lowercase hex id, as used for transaction guids and span ids.
#[must_use]
pub fn generate_guid() -> String {
    format!("{:016x}", rand::thread_rng().gen::<u64>())
}

/// Why a transaction refused an inbound trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InboundAcceptError {
    #[error("Transaction has already accepted an inbound trace")]
    Multiple,
    #[error("Transaction created outbound trace headers before accepting an inbound trace")]
    CreateBeforeAccept,
}

/// Trace context received from an upstream service.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InboundTraceContext {
    pub trace_id: String,
    pub parent_type: Option<DistributedTracingParentType>,
    pub parent_account_id: Option<String>,
    pub parent_app_id: Option<String>,
    pub parent_span_id: Option<String>,
    pub parent_transaction_id: Option<String>,
    /// Other vendors' `tracestate` entries, forwarded unchanged on outbound calls.
    pub vendor_state_entries: Vec<String>,
}

impl InboundTraceContext {
    #[must_use]
    pub fn from_payload(payload: &DistributedTracePayload) -> Self {
        InboundTraceContext {
            trace_id: payload.trace_id.clone(),
            parent_type: Some(payload.parent_type),
            parent_account_id: Some(payload.account_id.clone()),
            parent_app_id: Some(payload.app_id.clone()),
            parent_span_id: payload.guid.clone(),
            parent_transaction_id: payload.transaction_id.clone(),
            vendor_state_entries: Vec::new(),
        }
    }
}

/// The per-transaction state that outbound trace propagation reads.
#[derive(Debug)]
pub struct TransactionContext {
    guid: String,
    priority: f32,
    sampled: Option<bool>,
    inbound: Option<InboundTraceContext>,
    has_outgoing_trace_headers: AtomicBool,
}

impl TransactionContext {
    #[must_use]
    pub fn new(guid: impl Into<String>, priority: f32) -> Self {
        TransactionContext {
            guid: guid.into(),
            priority,
            sampled: None,
            inbound: None,
            has_outgoing_trace_headers: AtomicBool::new(false),
        }
    }

    /// Starts a transaction with a fresh guid and a random priority in `[0, 1)`.
    #[must_use]
    pub fn start() -> Self {
        TransactionContext::new(generate_guid(), rand::thread_rng().gen::<f32>())
    }

    #[must_use]
    pub fn guid(&self) -> &str {
        &self.guid
    }

    #[must_use]
    pub fn priority(&self) -> f32 {
        self.priority
    }

    /// `None` until the sampling decision has been made.
    #[must_use]
    pub fn sampled(&self) -> Option<bool> {
        self.sampled
    }

    pub fn set_sampled(&mut self, sampled: bool) {
        self.sampled = Some(sampled);
    }

    pub fn set_priority(&mut self, priority: f32) {
        self.priority = priority;
    }

    #[must_use]
    pub fn inbound(&self) -> Option<&InboundTraceContext> {
        self.inbound.as_ref()
    }

    pub fn set_inbound(&mut self, inbound: InboundTraceContext) {
        self.inbound = Some(inbound);
    }

    /// The inbound trace id when this transaction continues a trace, else its own guid.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        self.inbound
            .as_ref()
            .map_or(self.guid.as_str(), |inbound| inbound.trace_id.as_str())
    }

    #[must_use]
    pub fn vendor_state_entries(&self) -> &[String] {
        self.inbound
            .as_ref()
            .map_or(&[], |inbound| inbound.vendor_state_entries.as_slice())
    }

    /// Whether an inbound trace may still be accepted.
    ///
    /// # Errors
    ///
    /// [`InboundAcceptError::Multiple`] once an inbound trace was accepted,
    /// [`InboundAcceptError::CreateBeforeAccept`] once outbound trace headers
    /// were sent.
    pub fn check_can_accept_inbound(&self) -> Result<(), InboundAcceptError> {
        if self.inbound.is_some() {
            return Err(InboundAcceptError::Multiple);
        }
        if self.has_outgoing_trace_headers() {
            return Err(InboundAcceptError::CreateBeforeAccept);
        }
        Ok(())
    }

    /// Continues the trace described by an accepted payload.
    ///
    /// The upstream priority and sampling decision are adopted when present.
    ///
    /// # Errors
    ///
    /// Refuses the payload as [`Self::check_can_accept_inbound`] does.
    pub fn accept_inbound_payload(
        &mut self,
        payload: &DistributedTracePayload,
    ) -> Result<(), InboundAcceptError> {
        self.check_can_accept_inbound()?;
        if let Some(priority) = payload.priority {
            self.priority = priority;
        }
        if let Some(sampled) = payload.sampled {
            self.sampled = Some(sampled);
        }
        self.inbound = Some(InboundTraceContext::from_payload(payload));
        Ok(())
    }

    pub fn mark_outgoing_trace_headers(&self) {
        self.has_outgoing_trace_headers
            .store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn has_outgoing_trace_headers(&self) -> bool {
        self.has_outgoing_trace_headers.load(Ordering::Relaxed)
    }
}

/// The span identity of the segment making an outbound call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentSpan {
    span_id: String,
}

impl SegmentSpan {
    #[must_use]
    pub fn new(span_id: impl Into<String>) -> Self {
        SegmentSpan {
            span_id: span_id.into(),
        }
    }

    #[must_use]
    pub fn generate() -> Self {
        SegmentSpan::new(generate_guid())
    }

    #[must_use]
    pub fn span_id(&self) -> &str {
        &self.span_id
    }
}

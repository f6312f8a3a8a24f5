//! Supportability counters for distributed tracing.
//!
//! The propagation layer reports every accept/create outcome through an
//! [`AgentHealthReporter`]. The agent's metric harvest is an external
//! collaborator; [`CountingHealthReporter`] keeps process-local totals that a
//! harvester (or a test) can read through [`SupportabilityCounters::snapshot`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const ACCEPT_PAYLOAD_SUCCESS: &str = "Supportability/DistributedTrace/AcceptPayload/Success";
pub const ACCEPT_PAYLOAD_PARSE_EXCEPTION: &str =
    "Supportability/DistributedTrace/AcceptPayload/ParseException";
pub const ACCEPT_PAYLOAD_IGNORED_NULL: &str =
    "Supportability/DistributedTrace/AcceptPayload/Ignored/Null";
pub const ACCEPT_PAYLOAD_IGNORED_MAJOR_VERSION: &str =
    "Supportability/DistributedTrace/AcceptPayload/Ignored/MajorVersion";
pub const ACCEPT_PAYLOAD_IGNORED_UNTRUSTED_ACCOUNT: &str =
    "Supportability/DistributedTrace/AcceptPayload/Ignored/UntrustedAccount";
pub const ACCEPT_PAYLOAD_IGNORED_MULTIPLE: &str =
    "Supportability/DistributedTrace/AcceptPayload/Ignored/Multiple";
pub const ACCEPT_PAYLOAD_IGNORED_CREATE_BEFORE_ACCEPT: &str =
    "Supportability/DistributedTrace/AcceptPayload/Ignored/CreateBeforeAccept";
pub const CREATE_PAYLOAD_SUCCESS: &str = "Supportability/DistributedTrace/CreatePayload/Success";
pub const CREATE_PAYLOAD_EXCEPTION: &str =
    "Supportability/DistributedTrace/CreatePayload/Exception";
pub const TRACE_CONTEXT_CREATE_SUCCESS: &str = "Supportability/TraceContext/Create/Success";
pub const TRACE_CONTEXT_CREATE_EXCEPTION: &str = "Supportability/TraceContext/Create/Exception";

/// Hook invoked on distributed tracing outcomes.
pub trait AgentHealthReporter: Send + Sync {
    fn on_accept_payload_success(&self) {}
    /// Malformed base64, JSON or missing required fields.
    fn on_accept_payload_parse_exception(&self) {}
    /// Empty or missing header value.
    fn on_accept_payload_ignored_null(&self) {}
    /// Payload from a newer, unsupported major version.
    fn on_accept_payload_ignored_major_version(&self) {}
    fn on_accept_payload_ignored_untrusted_account(&self) {}
    /// The transaction already accepted an inbound trace.
    fn on_accept_payload_ignored_multiple(&self) {}
    /// The transaction already sent outbound trace headers.
    fn on_accept_payload_ignored_create_before_accept(&self) {}
    fn on_create_payload_success(&self) {}
    fn on_create_payload_exception(&self) {}
    fn on_trace_context_create_success(&self) {}
    fn on_trace_context_create_exception(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHealthReporter;

impl AgentHealthReporter for NoopHealthReporter {}

impl<T: AgentHealthReporter + ?Sized> AgentHealthReporter for Arc<T> {
    fn on_accept_payload_success(&self) {
        self.as_ref().on_accept_payload_success();
    }
    fn on_accept_payload_parse_exception(&self) {
        self.as_ref().on_accept_payload_parse_exception();
    }
    fn on_accept_payload_ignored_null(&self) {
        self.as_ref().on_accept_payload_ignored_null();
    }
    fn on_accept_payload_ignored_major_version(&self) {
        self.as_ref().on_accept_payload_ignored_major_version();
    }
    fn on_accept_payload_ignored_untrusted_account(&self) {
        self.as_ref().on_accept_payload_ignored_untrusted_account();
    }
    fn on_accept_payload_ignored_multiple(&self) {
        self.as_ref().on_accept_payload_ignored_multiple();
    }
    fn on_accept_payload_ignored_create_before_accept(&self) {
        self.as_ref().on_accept_payload_ignored_create_before_accept();
    }
    fn on_create_payload_success(&self) {
        self.as_ref().on_create_payload_success();
    }
    fn on_create_payload_exception(&self) {
        self.as_ref().on_create_payload_exception();
    }
    fn on_trace_context_create_success(&self) {
        self.as_ref().on_trace_context_create_success();
    }
    fn on_trace_context_create_exception(&self) {
        self.as_ref().on_trace_context_create_exception();
    }
}

#[derive(Debug, Default)]
pub struct SupportabilityCounters {
    accept_payload_success: AtomicU64,
    accept_payload_parse_exception: AtomicU64,
    accept_payload_ignored_null: AtomicU64,
    accept_payload_ignored_major_version: AtomicU64,
    accept_payload_ignored_untrusted_account: AtomicU64,
    accept_payload_ignored_multiple: AtomicU64,
    accept_payload_ignored_create_before_accept: AtomicU64,
    create_payload_success: AtomicU64,
    create_payload_exception: AtomicU64,
    trace_context_create_success: AtomicU64,
    trace_context_create_exception: AtomicU64,
}

impl SupportabilityCounters {
    #[must_use]
    pub fn snapshot(&self) -> SupportabilitySnapshot {
        SupportabilitySnapshot {
            accept_payload_success: self.accept_payload_success.load(Ordering::Relaxed),
            accept_payload_parse_exception: self
                .accept_payload_parse_exception
                .load(Ordering::Relaxed),
            accept_payload_ignored_null: self.accept_payload_ignored_null.load(Ordering::Relaxed),
            accept_payload_ignored_major_version: self
                .accept_payload_ignored_major_version
                .load(Ordering::Relaxed),
            accept_payload_ignored_untrusted_account: self
                .accept_payload_ignored_untrusted_account
                .load(Ordering::Relaxed),
            accept_payload_ignored_multiple: self
                .accept_payload_ignored_multiple
                .load(Ordering::Relaxed),
            accept_payload_ignored_create_before_accept: self
                .accept_payload_ignored_create_before_accept
                .load(Ordering::Relaxed),
            create_payload_success: self.create_payload_success.load(Ordering::Relaxed),
            create_payload_exception: self.create_payload_exception.load(Ordering::Relaxed),
            trace_context_create_success: self.trace_context_create_success.load(Ordering::Relaxed),
            trace_context_create_exception: self
                .trace_context_create_exception
                .load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SupportabilityCounters`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SupportabilitySnapshot {
    pub accept_payload_success: u64,
    pub accept_payload_parse_exception: u64,
    pub accept_payload_ignored_null: u64,
    pub accept_payload_ignored_major_version: u64,
    pub accept_payload_ignored_untrusted_account: u64,
    pub accept_payload_ignored_multiple: u64,
    pub accept_payload_ignored_create_before_accept: u64,
    pub create_payload_success: u64,
    pub create_payload_exception: u64,
    pub trace_context_create_success: u64,
    pub trace_context_create_exception: u64,
}

impl SupportabilitySnapshot {
    /// Metric name and count pairs, skipping zero counts.
    #[must_use]
    pub fn metrics(&self) -> Vec<(&'static str, u64)> {
        [
            (ACCEPT_PAYLOAD_SUCCESS, self.accept_payload_success),
            (
                ACCEPT_PAYLOAD_PARSE_EXCEPTION,
                self.accept_payload_parse_exception,
            ),
            (ACCEPT_PAYLOAD_IGNORED_NULL, self.accept_payload_ignored_null),
            (
                ACCEPT_PAYLOAD_IGNORED_MAJOR_VERSION,
                self.accept_payload_ignored_major_version,
            ),
            (
                ACCEPT_PAYLOAD_IGNORED_UNTRUSTED_ACCOUNT,
                self.accept_payload_ignored_untrusted_account,
            ),
            (
                ACCEPT_PAYLOAD_IGNORED_MULTIPLE,
                self.accept_payload_ignored_multiple,
            ),
            (
                ACCEPT_PAYLOAD_IGNORED_CREATE_BEFORE_ACCEPT,
                self.accept_payload_ignored_create_before_accept,
            ),
            (CREATE_PAYLOAD_SUCCESS, self.create_payload_success),
            (CREATE_PAYLOAD_EXCEPTION, self.create_payload_exception),
            (TRACE_CONTEXT_CREATE_SUCCESS, self.trace_context_create_success),
            (
                TRACE_CONTEXT_CREATE_EXCEPTION,
                self.trace_context_create_exception,
            ),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect()
    }
}

impl fmt::Display for SupportabilitySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metrics = self.metrics();
        if metrics.is_empty() {
            return f.write_str("none");
        }
        for (i, (name, count)) in metrics.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{name}={count}")?;
        }
        Ok(())
    }
}

/// Health reporter that accumulates into shared counters.
#[derive(Debug, Default, Clone)]
pub struct CountingHealthReporter {
    counters: Arc<SupportabilityCounters>,
}

impl CountingHealthReporter {
    #[must_use]
    pub fn new(counters: Arc<SupportabilityCounters>) -> Self {
        CountingHealthReporter { counters }
    }

    #[must_use]
    pub fn counters(&self) -> Arc<SupportabilityCounters> {
        Arc::clone(&self.counters)
    }

    #[must_use]
    pub fn snapshot(&self) -> SupportabilitySnapshot {
        self.counters.snapshot()
    }
}

impl AgentHealthReporter for CountingHealthReporter {
    fn on_accept_payload_success(&self) {
        self.counters
            .accept_payload_success
            .fetch_add(1, Ordering::Relaxed);
    }
    fn on_accept_payload_parse_exception(&self) {
        self.counters
            .accept_payload_parse_exception
            .fetch_add(1, Ordering::Relaxed);
    }
    fn on_accept_payload_ignored_null(&self) {
        self.counters
            .accept_payload_ignored_null
            .fetch_add(1, Ordering::Relaxed);
    }
    fn on_accept_payload_ignored_major_version(&self) {
        self.counters
            .accept_payload_ignored_major_version
            .fetch_add(1, Ordering::Relaxed);
    }
    fn on_accept_payload_ignored_untrusted_account(&self) {
        self.counters
            .accept_payload_ignored_untrusted_account
            .fetch_add(1, Ordering::Relaxed);
    }
    fn on_accept_payload_ignored_multiple(&self) {
        self.counters
            .accept_payload_ignored_multiple
            .fetch_add(1, Ordering::Relaxed);
    }
    fn on_accept_payload_ignored_create_before_accept(&self) {
        self.counters
            .accept_payload_ignored_create_before_accept
            .fetch_add(1, Ordering::Relaxed);
    }
    fn on_create_payload_success(&self) {
        self.counters
            .create_payload_success
            .fetch_add(1, Ordering::Relaxed);
    }
    fn on_create_payload_exception(&self) {
        self.counters
            .create_payload_exception
            .fetch_add(1, Ordering::Relaxed);
    }
    fn on_trace_context_create_success(&self) {
        self.counters
            .trace_context_create_success
            .fetch_add(1, Ordering::Relaxed);
    }
    fn on_trace_context_create_exception(&self) {
        self.counters
            .trace_context_create_exception
            .fetch_add(1, Ordering::Relaxed);
    }
}

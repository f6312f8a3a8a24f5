//! # New Relic Agent Core
//!
//! The transaction-side core of the New Relic agent: turning the flat list of
//! timed segments recorded for a transaction into a call tree, and propagating
//! distributed trace context between monitored applications.
//!
//! ## Overview
//!
//! - [`segments`]: segment records and the segment tree maker
//! - [`traces`]: transaction trace state and distributed trace propagation
//!   (the `newrelic` payload plus outbound W3C headers)
//! - [`config`]: agent configuration, environment loading and hot-swapping
//! - [`health`]: supportability counters reported by the propagation layer
//! - [`logger`]: log line formatting and subscriber setup
//!
//! Nothing in this crate blocks or performs I/O. All operations are safe to
//! call from any number of concurrent transactions.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_copy_implementations)]
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

/// Configuration management - environment variables, defaults and hot-swapping
pub mod config;

/// Supportability counters for distributed tracing
pub mod health;

/// Custom log formatter and subscriber initialization
pub mod logger;

/// Segments and segment tree assembly
pub mod segments;

/// Transaction context and distributed trace propagation
pub mod traces;

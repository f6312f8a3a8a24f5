//! Header carriers for trace propagation.
//!
//! The transport wrappers (HTTP clients, message-broker producers and
//! consumers) hand the handler a carrier; the handler only reads and writes
//! string headers through [`Extractor`] and [`Injector`]. Lookups are
//! case-insensitive, so `Newrelic`, `newrelic` and `NEWRELIC` all match.

use std::collections::HashMap;
use std::hash::BuildHasher;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

/// Writes propagation headers into an outbound request or message.
pub trait Injector {
    fn set(&mut self, key: &str, value: String);
}

/// Reads propagation headers from an inbound request or message.
pub trait Extractor {
    fn get(&self, key: &str) -> Option<&str>;

    fn keys(&self) -> Vec<&str>;
}

impl<S: BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        if let Some(value) = HashMap::get(self, key) {
            return Some(value.as_str());
        }
        // Message metadata is not always lowercased by the producer.
        self.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        HashMap::keys(self).map(String::as_str).collect()
    }
}

impl Injector for HeaderMap {
    fn set(&mut self, key: &str, value: String) {
        let name = match HeaderName::from_bytes(key.to_lowercase().as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                debug!("Skipping header with invalid name {key}: {e}");
                return;
            }
        };
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                self.insert(name, value);
            }
            Err(e) => debug!("Skipping header {key} with invalid value: {e}"),
        }
    }
}

impl Extractor for HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        HeaderMap::get(self, key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        HeaderMap::keys(self).map(HeaderName::as_str).collect()
    }
}

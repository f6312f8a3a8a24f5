//! Agent configuration.
//!
//! ## Configuration Priority
//!
//! Sources are applied in the order they are added to a [`ConfigBuilder`];
//! later sources override earlier ones:
//!
//! 1. **Defaults** - distributed tracing, span events and transaction events on
//! 2. **Environment variables** - `NEW_RELIC_*` (see [`env::EnvConfigSource`])
//!
//! Account, application and trust identifiers normally arrive from the
//! collector at connect time and are pushed into a [`SharedConfiguration`].
//! Consumers hold a [`ConfigurationService`] and re-read the current snapshot
//! on every call, so an update takes effect on the next payload decision.

pub mod env;
pub mod log_level;

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Deserializer};
use serde_aux::prelude::deserialize_bool_from_anything;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::log_level::LogLevel;

#[macro_export]
macro_rules! merge_option {
    ($config:expr, $source:expr, $field:ident) => {
        if $source.$field.is_some() {
            $config.$field.clone_from(&$source.$field);
        }
    };
}

#[macro_export]
macro_rules! merge_value {
    ($config:expr, $source:expr, $field:ident) => {
        if let Some(value) = $source.$field {
            $config.$field = value;
        }
    };
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

pub trait ConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_level: LogLevel,

    pub distributed_tracing_enabled: bool,
    pub span_events_enabled: bool,
    pub transaction_events_enabled: bool,
    /// Suppress the `newrelic` header and send only the W3C headers.
    pub exclude_newrelic_header: bool,
    /// Report success counters in addition to failure counters.
    pub payload_success_metrics_enabled: bool,

    pub account_id: Option<String>,
    pub primary_application_id: Option<String>,
    pub trusted_account_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: LogLevel::default(),
            distributed_tracing_enabled: true,
            span_events_enabled: true,
            transaction_events_enabled: true,
            exclude_newrelic_header: false,
            payload_success_metrics_enabled: true,
            account_id: None,
            primary_application_id: None,
            trusted_account_key: None,
        }
    }
}

#[derive(Default)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Config,
}

impl ConfigBuilder {
    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(&mut self) -> Config {
        let mut failed_sources = 0;
        for source in &self.sources {
            if let Err(e) = source.load(&mut self.config) {
                error!("Failed to load config: {e}");
                failed_sources += 1;
            }
        }

        if !self.sources.is_empty() && failed_sources == self.sources.len() {
            debug!("All sources failed to load config, using default config.");
        }

        self.config.normalize_identifiers();
        self.config.clone()
    }
}

impl Config {
    /// Trims the account, application and trust identifiers. Blank ones become `None`.
    fn normalize_identifiers(&mut self) {
        for id in [
            &mut self.account_id,
            &mut self.primary_application_id,
            &mut self.trusted_account_key,
        ] {
            normalize_identifier(id);
        }
    }
}

fn normalize_identifier(id: &mut Option<String>) {
    if let Some(value) = id.as_deref() {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            *id = None;
        } else if trimmed.len() != value.len() {
            *id = Some(trimmed.to_string());
        }
    }
}

/// Builds the configuration from defaults and `NEW_RELIC_*` environment variables.
#[must_use]
pub fn get_config() -> Config {
    ConfigBuilder::default()
        .add_source(Box::new(env::EnvConfigSource))
        .build()
}

/// Read access to the current configuration snapshot.
pub trait ConfigurationService: Send + Sync {
    fn configuration(&self) -> Arc<Config>;
}

/// A fixed snapshot, mostly useful in tests.
impl ConfigurationService for Config {
    fn configuration(&self) -> Arc<Config> {
        Arc::new(self.clone())
    }
}

/// Configuration that the host can replace at runtime.
#[derive(Debug)]
pub struct SharedConfiguration {
    current: ArcSwap<Config>,
}

impl SharedConfiguration {
    #[must_use]
    pub fn new(mut config: Config) -> Self {
        config.normalize_identifiers();
        SharedConfiguration {
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Replaces the current configuration. Identifiers are normalized the same
    /// way [`ConfigBuilder::build`] normalizes them.
    pub fn update(&self, mut config: Config) {
        config.normalize_identifiers();
        debug!(
            "Configuration updated: distributed_tracing_enabled={} account_id={:?} primary_application_id={:?}",
            config.distributed_tracing_enabled, config.account_id, config.primary_application_id
        );
        self.current.store(Arc::new(config));
    }
}

impl Default for SharedConfiguration {
    fn default() -> Self {
        SharedConfiguration::new(Config::default())
    }
}

impl ConfigurationService for SharedConfiguration {
    fn configuration(&self) -> Arc<Config> {
        self.current.load_full()
    }
}

impl<T: ConfigurationService> ConfigurationService for Arc<T> {
    fn configuration(&self) -> Arc<Config> {
        self.as_ref().configuration()
    }
}

pub fn deserialize_string_or_int<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => {
            error!("Failed to parse value, expected a string or an integer, ignoring");
            Ok(None)
        }
    }
}

pub fn deserialize_optional_bool_from_anything<'de, D>(
    deserializer: D,
) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Value> = Option::deserialize(deserializer)?;

    match opt {
        None => Ok(None),
        Some(value) => match deserialize_bool_from_anything(value) {
            Ok(bool_result) => Ok(Some(bool_result)),
            Err(e) => {
                error!("Failed to parse bool value: {}, ignoring", e);
                Ok(None)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    impl ConfigSource for FailingSource {
        fn load(&self, _config: &mut Config) -> Result<(), ConfigError> {
            Err(ConfigError::ParseError("broken".to_string()))
        }
    }

    struct FixedSource(Config);

    impl ConfigSource for FixedSource {
        fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
            config.clone_from(&self.0);
            Ok(())
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.distributed_tracing_enabled);
        assert!(config.span_events_enabled);
        assert!(config.transaction_events_enabled);
        assert!(!config.exclude_newrelic_header);
        assert!(config.payload_success_metrics_enabled);
        assert_eq!(config.account_id, None);
        assert_eq!(config.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_failed_sources_fall_back_to_defaults() {
        let config = ConfigBuilder::default()
            .add_source(Box::new(FailingSource))
            .build();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_later_sources_win_and_identifiers_are_trimmed() {
        let config = ConfigBuilder::default()
            .add_source(Box::new(FailingSource))
            .add_source(Box::new(FixedSource(Config {
                account_id: Some(" 33 ".to_string()),
                primary_application_id: Some("   ".to_string()),
                trusted_account_key: Some("33".to_string()),
                span_events_enabled: false,
                ..Config::default()
            })))
            .build();

        assert_eq!(config.account_id.as_deref(), Some("33"));
        assert_eq!(config.primary_application_id, None);
        assert_eq!(config.trusted_account_key.as_deref(), Some("33"));
        assert!(!config.span_events_enabled);
    }

    #[test]
    fn test_shared_configuration_is_hot_swappable() {
        let shared = Arc::new(SharedConfiguration::default());
        let reader: Arc<SharedConfiguration> = Arc::clone(&shared);
        assert!(reader.configuration().distributed_tracing_enabled);

        shared.update(Config {
            distributed_tracing_enabled: false,
            ..Config::default()
        });
        assert!(!reader.configuration().distributed_tracing_enabled);
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::ParseError("bad".to_string()).to_string(),
            "Failed to parse configuration: bad"
        );
    }

    #[test]
    fn test_shared_configuration_normalizes_identifiers() {
        let shared = SharedConfiguration::new(Config {
            account_id: Some(" 33 ".to_string()),
            ..Config::default()
        });
        assert_eq!(shared.configuration().account_id.as_deref(), Some("33"));

        shared.update(Config {
            account_id: Some(String::new()),
            primary_application_id: Some("  ".to_string()),
            trusted_account_key: Some("\t33\n".to_string()),
            ..Config::default()
        });
        let config = shared.configuration();
        assert_eq!(config.account_id, None);
        assert_eq!(config.primary_application_id, None);
        assert_eq!(config.trusted_account_key.as_deref(), Some("33"));
    }
}

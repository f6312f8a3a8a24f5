//! `NEW_RELIC_*` environment variable configuration.
//!
//! | Variable | Field |
//! |---|---|
//! | `NEW_RELIC_LOG_LEVEL` | `log_level` |
//! | `NEW_RELIC_DISTRIBUTED_TRACING_ENABLED` | `distributed_tracing_enabled` |
//! | `NEW_RELIC_SPAN_EVENTS_ENABLED` | `span_events_enabled` |
//! | `NEW_RELIC_TRANSACTION_EVENTS_ENABLED` | `transaction_events_enabled` |
//! | `NEW_RELIC_DISTRIBUTED_TRACING_EXCLUDE_NEWRELIC_HEADER` | `exclude_newrelic_header` |
//! | `NEW_RELIC_PAYLOAD_SUCCESS_METRICS_ENABLED` | `payload_success_metrics_enabled` |
//! | `NEW_RELIC_ACCOUNT_ID` | `account_id` |
//! | `NEW_RELIC_PRIMARY_APPLICATION_ID` | `primary_application_id` |
//! | `NEW_RELIC_TRUSTED_ACCOUNT_KEY` | `trusted_account_key` |

use figment::{providers::Env, Figment};
use serde::Deserialize;

use crate::{
    config::{
        deserialize_optional_bool_from_anything, deserialize_string_or_int, log_level::LogLevel,
        Config, ConfigError, ConfigSource,
    },
    merge_option, merge_value,
};

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
struct EnvConfig {
    log_level: Option<LogLevel>,

    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    distributed_tracing_enabled: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    span_events_enabled: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    transaction_events_enabled: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    distributed_tracing_exclude_newrelic_header: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    payload_success_metrics_enabled: Option<bool>,

    #[serde(deserialize_with = "deserialize_string_or_int")]
    account_id: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    primary_application_id: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    trusted_account_key: Option<String>,
}

fn merge_config(config: &mut Config, env_config: &EnvConfig) {
    merge_value!(config, env_config, log_level);
    merge_value!(config, env_config, distributed_tracing_enabled);
    merge_value!(config, env_config, span_events_enabled);
    merge_value!(config, env_config, transaction_events_enabled);
    merge_value!(config, env_config, payload_success_metrics_enabled);
    if let Some(exclude) = env_config.distributed_tracing_exclude_newrelic_header {
        config.exclude_newrelic_header = exclude;
    }

    merge_option!(config, env_config, account_id);
    merge_option!(config, env_config, primary_application_id);
    merge_option!(config, env_config, trusted_account_key);
}

#[derive(Debug, Clone, Copy)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Env::prefixed("NEW_RELIC_"));

        match figment.extract::<EnvConfig>() {
            Ok(env_config) => merge_config(config, &env_config),
            Err(e) => {
                return Err(ConfigError::ParseError(format!(
                    "Failed to parse config from environment variables: {e}, using default config."
                )));
            }
        }

        Ok(())
    }
}

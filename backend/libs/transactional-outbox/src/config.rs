use serde::Deserialize;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::poller::PollerConfig;

/// Poller settings read from unprefixed environment variables
/// (`BATCH_SIZE`, `POLL_INTERVAL_SECONDS`, ...).
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_interval"))]
pub struct OutboxEnvConfig {
    #[validate(range(min = 1, max = 100000))]
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: f64,

    /// 0 disables the limit
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    #[validate(custom(function = "config_core::validate_identifier"))]
    #[serde(default = "default_outbox_table")]
    pub outbox_table: String,

    #[serde(default)]
    pub run_migrations: bool,

    /// Port for `/health` and `/metrics`; no server when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_batch_size() -> i64 {
    500
}

fn default_poll_interval_seconds() -> f64 {
    1.0
}

fn default_max_consecutive_failures() -> u32 {
    10
}

fn default_outbox_table() -> String {
    "user_logins".to_string()
}

fn validate_interval(config: &OutboxEnvConfig) -> Result<(), ValidationError> {
    let seconds = config.poll_interval_seconds;
    if seconds.is_finite() && seconds > 0.0 && seconds <= 3600.0 {
        Ok(())
    } else {
        Err(ValidationError::new("poll_interval_out_of_range"))
    }
}

impl OutboxEnvConfig {
    pub fn from_env() -> config_core::ConfigResult<Self> {
        config_core::from_env("")
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            batch_size: self.batch_size,
            poll_interval: Duration::from_secs_f64(self.poll_interval_seconds),
            max_consecutive_failures: self.max_consecutive_failures,
            ..PollerConfig::default()
        }
    }
}

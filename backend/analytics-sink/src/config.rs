use serde::Deserialize;
use std::time::Duration;
use validator::Validate;

use crate::writer::WriterConfig;

/// Sink loop settings read from unprefixed environment variables.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SinkEnvConfig {
    /// Events per insert; 1 inserts and commits every message on its own
    #[validate(range(min = 1, max = 100000))]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[validate(range(min = 1, max = 60000))]
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Upper bound for the flush performed on shutdown
    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_final_flush_timeout_secs")]
    pub final_flush_timeout_secs: u64,

    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_batch_size() -> usize {
    1
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_final_flush_timeout_secs() -> u64 {
    30
}

impl SinkEnvConfig {
    pub fn from_env() -> config_core::ConfigResult<Self> {
        config_core::from_env("")
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            batch_size: self.batch_size,
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            final_flush_timeout: Duration::from_secs(self.final_flush_timeout_secs),
        }
    }
}

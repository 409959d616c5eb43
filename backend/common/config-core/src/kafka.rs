//! Kafka configuration
//!
//! Read from `KAFKA_*` variables. The producer side is tuned for idempotent,
//! fully acknowledged writes; the consumer side never auto-commits.

use serde::Deserialize;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Kafka configuration
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_delivery_guarantees"))]
pub struct KafkaConfig {
    /// Bootstrap servers, comma separated
    #[validate(length(min = 1))]
    #[serde(default = "default_bootstrap")]
    pub bootstrap: String,

    /// Topic carrying the events
    #[validate(length(min = 1, max = 249))]
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Consumer group id (sink only)
    #[validate(length(min = 1, max = 255))]
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Acknowledgment level
    #[serde(default)]
    pub acks: Acks,

    /// Idempotence
    #[serde(default = "default_idempotent")]
    pub enable_idempotence: bool,

    /// Linger time in milliseconds
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,

    /// Maximum messages per producer batch
    #[validate(range(min = 1, max = 1000000))]
    #[serde(default = "default_batch_num_messages")]
    pub batch_num_messages: u32,

    /// Transport-level retries
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Backoff between transport-level retries
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// End-to-end delivery timeout for one message
    #[validate(range(min = 1))]
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    /// Hard limit on waiting for a whole batch to be acknowledged
    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,

    /// Auto offset reset
    #[serde(default)]
    pub auto_offset_reset: OffsetReset,

    /// Session timeout in milliseconds
    #[validate(range(min = 1000))]
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
}

fn default_bootstrap() -> String {
    "localhost:9093".to_string()
}

fn default_topic() -> String {
    "user_logins".to_string()
}

fn default_group_id() -> String {
    "ch_sink_group".to_string()
}

fn default_idempotent() -> bool {
    true
}

fn default_linger_ms() -> u64 {
    50
}

fn default_batch_num_messages() -> u32 {
    10_000
}

fn default_retries() -> u32 {
    10
}

fn default_retry_backoff_ms() -> u64 {
    300
}

fn default_delivery_timeout_ms() -> u64 {
    120_000
}

fn default_flush_timeout_secs() -> u64 {
    30
}

fn default_session_timeout_ms() -> u64 {
    45_000
}

fn validate_delivery_guarantees(config: &KafkaConfig) -> Result<(), ValidationError> {
    if config.enable_idempotence && config.acks != Acks::All {
        return Err(ValidationError::new("idempotence_requires_acks_all"));
    }
    Ok(())
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap: default_bootstrap(),
            topic: default_topic(),
            group_id: default_group_id(),
            acks: Acks::default(),
            enable_idempotence: default_idempotent(),
            linger_ms: default_linger_ms(),
            batch_num_messages: default_batch_num_messages(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            flush_timeout_secs: default_flush_timeout_secs(),
            auto_offset_reset: OffsetReset::default(),
            session_timeout_ms: default_session_timeout_ms(),
        }
    }
}

impl KafkaConfig {
    /// Load from `KAFKA_*` variables.
    pub fn from_env() -> crate::ConfigResult<Self> {
        crate::from_env("KAFKA_")
    }

    /// Hard timeout for waiting on a full batch of delivery reports
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }

    /// librdkafka properties for the outbox producer
    pub fn producer_properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("bootstrap.servers", self.bootstrap.clone()),
            ("enable.idempotence", self.enable_idempotence.to_string()),
            ("acks", self.acks.as_str().to_string()),
            ("linger.ms", self.linger_ms.to_string()),
            ("batch.num.messages", self.batch_num_messages.to_string()),
            ("retries", self.retries.to_string()),
            ("retry.backoff.ms", self.retry_backoff_ms.to_string()),
            ("delivery.timeout.ms", self.delivery_timeout_ms.to_string()),
        ]
    }

    /// librdkafka properties for the sink consumer
    ///
    /// Offsets are only ever committed explicitly after a successful insert,
    /// so both auto commit and auto offset store are off.
    pub fn consumer_properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("bootstrap.servers", self.bootstrap.clone()),
            ("group.id", self.group_id.clone()),
            ("enable.auto.commit", "false".to_string()),
            ("enable.auto.offset.store", "false".to_string()),
            ("auto.offset.reset", self.auto_offset_reset.as_str().to_string()),
            ("session.timeout.ms", self.session_timeout_ms.to_string()),
        ]
    }
}

/// Acknowledgment level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Acks {
    /// No acknowledgment
    #[serde(rename = "0")]
    None,
    /// Leader acknowledgment
    #[serde(rename = "1")]
    One,
    /// All in-sync replicas acknowledgment
    #[default]
    #[serde(rename = "all", alias = "-1")]
    All,
}

impl Acks {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acks::None => "0",
            Acks::One => "1",
            Acks::All => "all",
        }
    }
}

/// Offset reset strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    /// Start from earliest offset
    #[default]
    Earliest,
    /// Start from latest offset
    Latest,
    /// Fail if no committed offset exists
    Error,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
            OffsetReset::Error => "error",
        }
    }
}

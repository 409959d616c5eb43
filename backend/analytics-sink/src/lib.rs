//! Kafka to ClickHouse sink for outbox events.
//!
//! Consumes the events published by the outbox poller, inserts them into a
//! `ReplacingMergeTree` table keyed by `event_id` and commits consumer
//! offsets only after the insert succeeded. Delivery is at-least-once; the
//! table collapses the duplicates.

pub mod batch;
pub mod config;
mod error;
pub mod metrics;
pub mod source;
pub mod store;
pub mod writer;

pub use batch::Batch;
pub use config::SinkEnvConfig;
pub use error::{SinkError, SinkResult};
pub use source::{KafkaMessageSource, MessageSource, OffsetTracker, SourceMessage};
pub use store::{AnalyticalRow, AnalyticalStore, ClickHouseStore};
pub use writer::{SinkWriter, WriterConfig};

use rdkafka::error::KafkaError;
use thiserror::Error;

pub type SinkResult<T> = std::result::Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    /// Message body could not be turned into an event
    #[error("Undecodable message at {topic}[{partition}]@{offset}: {source}")]
    Decode {
        topic: String,
        partition: i32,
        offset: i64,
        source: event_schema::EventError,
    },

    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("Offset commit failed: {0}")]
    Commit(#[source] KafkaError),

    #[error("ClickHouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

//! Error types for the transactional outbox library.

use thiserror::Error;

/// Result type alias for outbox operations.
pub type OutboxResult<T> = Result<T, OutboxError>;

/// Errors that can occur during outbox operations.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Database operation failed
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// Kafka client could not be created or queried
    #[error("Kafka error: {0}")]
    KafkaError(#[from] rdkafka::error::KafkaError),

    /// Event could not be encoded as a broker message
    #[error("Serialization error: {0}")]
    SerializationError(#[from] event_schema::EventError),

    /// At least one message of the batch was rejected by the broker
    #[error("{failed} of {submitted} deliveries failed, first error: {first_error}")]
    DeliveryFailed {
        submitted: usize,
        failed: usize,
        first_error: String,
    },

    /// Flush timeout elapsed with messages still in flight
    #[error("{remaining} of {submitted} messages still undelivered at flush timeout")]
    DeliveryTimeout { submitted: usize, remaining: usize },

    /// The mark-published update touched a different number of rows than were locked
    #[error("Marked {marked} rows as published but the batch had {expected}")]
    MarkMismatch { expected: usize, marked: u64 },

    /// Shutdown was requested while the cycle was in flight
    #[error("Cycle interrupted by shutdown")]
    Interrupted,

    /// Transient failures kept happening past the configured limit
    #[error("Giving up after {failures} consecutive failed cycles: {last}")]
    TooManyFailures {
        failures: u32,
        #[source]
        last: Box<OutboxError>,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("Outbox error: {0}")]
    Other(#[from] anyhow::Error),
}

impl OutboxError {
    /// Whether a later cycle can reasonably succeed where this one failed.
    ///
    /// Transient failures leave the rows unpublished and are retried with
    /// backoff; everything else stops the poller.
    pub fn is_transient(&self) -> bool {
        match self {
            OutboxError::DatabaseError(e) => !matches!(
                e,
                sqlx::Error::Configuration(_)
                    | sqlx::Error::ColumnNotFound(_)
                    | sqlx::Error::ColumnDecode { .. }
                    | sqlx::Error::Decode(_)
                    | sqlx::Error::TypeNotFound { .. }
            ),
            OutboxError::KafkaError(_)
            | OutboxError::DeliveryFailed { .. }
            | OutboxError::DeliveryTimeout { .. }
            | OutboxError::MarkMismatch { .. } => true,
            OutboxError::SerializationError(_)
            | OutboxError::Interrupted
            | OutboxError::TooManyFailures { .. }
            | OutboxError::ConfigError(_)
            | OutboxError::Other(_) => false,
        }
    }
}

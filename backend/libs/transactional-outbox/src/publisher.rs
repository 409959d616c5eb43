//! Batch publishing with per-cycle delivery bookkeeping.

use async_trait::async_trait;
use config_core::KafkaConfig;
use event_schema::Event;
use futures::stream::{FuturesUnordered, StreamExt};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{OutboxError, OutboxResult};

/// Delivery outcome of one batch, owned by the cycle that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Messages handed to the producer
    pub submitted: usize,
    /// Messages acknowledged by the broker
    pub delivered: usize,
    /// `(event_id, error)` for every rejected message
    pub failures: Vec<(i64, String)>,
}

impl DeliveryReport {
    pub fn record_delivered(&mut self) {
        self.delivered += 1;
    }

    pub fn record_failure(&mut self, event_id: i64, error: impl Into<String>) {
        self.failures.push((event_id, error.into()));
    }

    /// Submitted messages with no delivery result yet
    pub fn remaining(&self) -> usize {
        self.submitted
            .saturating_sub(self.delivered + self.failures.len())
    }

    /// Turn the report into the cycle verdict: the delivered count when every
    /// message was acknowledged, an error otherwise.
    pub fn into_result(self) -> OutboxResult<usize> {
        if let Some((event_id, error)) = self.failures.first() {
            return Err(OutboxError::DeliveryFailed {
                submitted: self.submitted,
                failed: self.failures.len(),
                first_error: format!("event {event_id}: {error}"),
            });
        }
        if self.remaining() > 0 {
            return Err(OutboxError::DeliveryTimeout {
                submitted: self.submitted,
                remaining: self.remaining(),
            });
        }
        Ok(self.delivered)
    }
}

/// Publishes a batch of events and reports per-message delivery.
///
/// Implementations return once every submitted message has a delivery result
/// or the flush timeout elapsed, whichever comes first.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_batch(&self, events: &[Event]) -> OutboxResult<DeliveryReport>;
}

/// Kafka-based implementation of EventPublisher.
///
/// The producer is created with idempotence on and `acks=all` (enforced by
/// config validation), so a delivery report means the message is replicated.
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topic: String,
    flush_timeout: Duration,
}

impl KafkaEventPublisher {
    pub fn new(config: &KafkaConfig) -> OutboxResult<Self> {
        let mut client_config = ClientConfig::new();
        for (key, value) in config.producer_properties() {
            client_config.set(key, value);
        }
        let producer: FutureProducer = client_config.create()?;

        info!(
            bootstrap = %config.bootstrap,
            topic = %config.topic,
            acks = config.acks.as_str(),
            idempotence = config.enable_idempotence,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            flush_timeout: config.flush_timeout(),
        })
    }

    /// Fetch cluster metadata to prove the brokers are reachable.
    ///
    /// Returns the number of brokers in the cluster.
    pub async fn check_connectivity(&self, timeout: Duration) -> OutboxResult<usize> {
        let producer = self.producer.clone();
        let brokers = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, Timeout::After(timeout))
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(|e| OutboxError::Other(e.into()))??;

        Ok(brokers)
    }

    /// Drain whatever is still queued in the producer, best effort.
    pub async fn flush(&self, timeout: Duration) -> OutboxResult<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| OutboxError::Other(e.into()))??;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish_batch(&self, events: &[Event]) -> OutboxResult<DeliveryReport> {
        let deadline = tokio::time::Instant::now() + self.flush_timeout;
        let mut report = DeliveryReport::default();
        let mut in_flight = FuturesUnordered::new();

        for event in events {
            let message = event.to_broker_message()?;
            let record = FutureRecord::to(&self.topic)
                .key(&message.key)
                .payload(&message.value);

            report.submitted += 1;
            match self.producer.send_result(record) {
                Ok(delivery) => {
                    let event_id = event.event_id;
                    in_flight.push(async move { (event_id, delivery.await) });
                }
                Err((e, _)) => {
                    // The cycle is lost anyway; stop queueing more duplicates.
                    report.record_failure(event.event_id, e.to_string());
                    break;
                }
            }
        }

        loop {
            match tokio::time::timeout_at(deadline, in_flight.next()).await {
                Ok(Some((_, Ok(Ok(_))))) => report.record_delivered(),
                Ok(Some((event_id, Ok(Err((e, _)))))) => {
                    warn!(event_id, error = %e, "Delivery failed");
                    report.record_failure(event_id, e.to_string());
                }
                Ok(Some((event_id, Err(_)))) => {
                    report.record_failure(event_id, "delivery report dropped by producer");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        remaining = report.remaining(),
                        timeout_secs = self.flush_timeout.as_secs(),
                        "Flush timeout reached with messages in flight"
                    );
                    break;
                }
            }
        }

        debug!(
            submitted = report.submitted,
            delivered = report.delivered,
            failed = report.failures.len(),
            "Batch delivery finished"
        );
        Ok(report)
    }
}

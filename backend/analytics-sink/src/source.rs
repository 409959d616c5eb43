//! Broker side of the sink: polling messages and committing offsets.

use async_trait::async_trait;
use config_core::KafkaConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::{SinkError, SinkResult};

/// A consumed message detached from the consumer's buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

/// Highest consumed offset per (topic, partition).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetTracker {
    highest: BTreeMap<(String, i32), i64>,
}

impl OffsetTracker {
    pub fn record(&mut self, topic: &str, partition: i32, offset: i64) {
        self.highest
            .entry((topic.to_string(), partition))
            .and_modify(|current| *current = (*current).max(offset))
            .or_insert(offset);
    }

    /// Positions to commit: the next offset to read for every partition seen.
    pub fn commit_positions(&self) -> Vec<(String, i32, i64)> {
        self.highest
            .iter()
            .map(|((topic, partition), offset)| (topic.clone(), *partition, offset + 1))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.highest.is_empty()
    }

    pub fn clear(&mut self) {
        self.highest.clear();
    }
}

/// Where the sink reads from.
#[async_trait]
pub trait MessageSource: Send {
    /// Next message, or `None` if nothing arrived within `timeout`.
    async fn poll(&mut self, timeout: Duration) -> SinkResult<Option<SourceMessage>>;

    /// Synchronously commit `offset + 1` for every tracked partition.
    async fn commit(&mut self, offsets: &OffsetTracker) -> SinkResult<()>;

    /// Leave the consumer group.
    async fn close(&mut self) -> SinkResult<()>;
}

/// Kafka consumer with manual, synchronous offset commits.
pub struct KafkaMessageSource {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaMessageSource {
    pub fn new(config: &KafkaConfig) -> SinkResult<Self> {
        let mut client_config = ClientConfig::new();
        for (key, value) in config.consumer_properties() {
            client_config.set(key, value);
        }
        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[config.topic.as_str()])?;

        info!(
            bootstrap = %config.bootstrap,
            topic = %config.topic,
            group_id = %config.group_id,
            auto_offset_reset = config.auto_offset_reset.as_str(),
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn poll(&mut self, timeout: Duration) -> SinkResult<Option<SourceMessage>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(SinkError::Kafka(e)),
            Ok(Ok(message)) => Ok(Some(SourceMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                payload: message.payload().map(<[u8]>::to_vec),
            })),
        }
    }

    async fn commit(&mut self, offsets: &OffsetTracker) -> SinkResult<()> {
        if offsets.is_empty() {
            return Ok(());
        }
        let mut tpl = TopicPartitionList::new();
        for (topic, partition, offset) in offsets.commit_positions() {
            tpl.add_partition_offset(&topic, partition, Offset::Offset(offset))?;
        }
        let partitions = tpl.count();

        // Sync commits block until the group coordinator answers.
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await?
            .map_err(SinkError::Commit)?;

        debug!(partitions, "Offsets committed");
        Ok(())
    }

    async fn close(&mut self) -> SinkResult<()> {
        self.consumer.unsubscribe();
        info!(topic = %self.topic, "Kafka consumer unsubscribed");
        Ok(())
    }
}

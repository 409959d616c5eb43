//! Sink loop: poll, decode, batch, insert, then commit.
//!
//! Offsets only move after the batch they cover is in ClickHouse. A crash in
//! between re-delivers the batch on restart and the table's deduplication by
//! `event_id` absorbs the second insert.

use chrono::Utc;
use event_schema::Event;
use resilience::with_timeout;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::batch::Batch;
use crate::metrics::SinkMetrics;
use crate::source::MessageSource;
use crate::store::{AnalyticalRow, AnalyticalStore};
use crate::{SinkError, SinkResult};

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub batch_size: usize,
    /// Longest single wait on the broker
    pub poll_timeout: Duration,
    pub final_flush_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            poll_timeout: Duration::from_secs(1),
            final_flush_timeout: Duration::from_secs(30),
        }
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub struct SinkWriter<S: MessageSource, A: AnalyticalStore> {
    source: S,
    store: Arc<A>,
    config: WriterConfig,
    shutdown: watch::Receiver<bool>,
    metrics: Option<SinkMetrics>,
    batch: Batch,
    total_inserted: u64,
}

impl<S: MessageSource, A: AnalyticalStore> SinkWriter<S, A> {
    pub fn new(
        source: S,
        store: Arc<A>,
        config: WriterConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let batch = Batch::new(config.batch_size);
        Self {
            source,
            store,
            config,
            shutdown,
            metrics: None,
            batch,
            total_inserted: 0,
        }
    }

    pub fn with_metrics(mut self, metrics: SinkMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn total_inserted(&self) -> u64 {
        self.total_inserted
    }

    /// Events buffered and not yet inserted
    pub fn buffered(&self) -> usize {
        self.batch.len()
    }

    /// Consume until shutdown or a fatal error.
    ///
    /// Either way the buffered events get one last flush attempt and the
    /// source is closed before returning. A failed last flush is logged, not
    /// returned; the fatal error that ended the loop is.
    pub async fn run(&mut self) -> SinkResult<()> {
        info!(
            batch_size = self.config.batch_size,
            poll_timeout_ms = self.config.poll_timeout.as_millis() as u64,
            "Sink writer starting"
        );

        let result = self.consume().await;
        match &result {
            Ok(()) => info!(
                buffered = self.batch.len(),
                "Shutdown requested, flushing remaining messages"
            ),
            Err(e) => error!(error = %e, buffered = self.batch.len(), "Fatal error in sink loop"),
        }

        if !self.batch.is_empty() {
            let buffered = self.batch.len();
            match with_timeout(self.config.final_flush_timeout, self.flush()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, buffered, "Failed to flush remaining messages");
                }
                Err(e) => {
                    error!(error = %e, buffered, "Failed to flush remaining messages");
                }
            }
        }

        if let Err(e) = self.source.close().await {
            warn!(error = %e, "Failed to close message source");
        }
        info!(total_inserted = self.total_inserted, "Sink writer stopped");

        result
    }

    async fn consume(&mut self) -> SinkResult<()> {
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let polled = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => return Ok(()),
                polled = self.source.poll(self.config.poll_timeout) => polled?,
            };
            let Some(message) = polled else {
                continue;
            };

            let event = Event::decode(message.payload.as_deref()).map_err(|source| {
                SinkError::Decode {
                    topic: message.topic.clone(),
                    partition: message.partition,
                    offset: message.offset,
                    source,
                }
            })?;
            debug!(
                event_id = event.event_id,
                partition = message.partition,
                offset = message.offset,
                "Message accepted"
            );

            self.batch.push(event, &message);
            if let Some(metrics) = &self.metrics {
                metrics.consumed.inc();
                metrics.batch_fill.set(self.batch.len() as i64);
            }

            if self.batch.is_full() {
                self.flush().await?;
            }
        }
    }

    /// Insert the buffered events, then commit their offsets.
    ///
    /// The batch is kept when either step fails, so a later flush retries
    /// both.
    pub async fn flush(&mut self) -> SinkResult<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let started = Instant::now();
        let ingested_at = Utc::now();

        let rows = self
            .batch
            .events()
            .iter()
            .map(|event| AnalyticalRow::from_event(event, ingested_at))
            .collect::<SinkResult<Vec<_>>>()?;

        if let Err(e) = self.store.insert_batch(&rows).await {
            self.record_failure();
            return Err(e);
        }
        if let Err(e) = self.source.commit(self.batch.offsets()).await {
            self.record_failure();
            return Err(e);
        }

        let inserted = rows.len() as u64;
        self.total_inserted += inserted;
        if let Some((topic, partition, offset)) = self.batch.last_position() {
            info!(
                rows = inserted,
                topic = %topic,
                partition,
                offset,
                elapsed_ms = started.elapsed().as_millis() as u64,
                total_inserted = self.total_inserted,
                "Inserted rows into ClickHouse and committed offsets"
            );
        }
        self.batch.clear();

        if let Some(metrics) = &self.metrics {
            metrics.inserted.inc_by(inserted);
            metrics.flushes.inc();
            metrics.batch_fill.set(0);
        }
        Ok(())
    }

    fn record_failure(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.flush_failures.inc();
        }
    }
}

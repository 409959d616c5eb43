//! Outbox poll loop.
//!
//! One cycle = one transaction: lock a slice of unpublished rows, publish the
//! whole slice, and flag the rows only once every message is acknowledged.
//! Any failure rolls the transaction back so the rows become visible to the
//! next cycle (or to another poller instance) untouched.

use event_schema::Event;
use resilience::Backoff;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::metrics::OutboxMetrics;
use crate::publisher::EventPublisher;
use crate::repository::{OutboxRow, OutboxStore, OutboxTransaction};
use crate::{OutboxError, OutboxResult};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Max rows locked and published per cycle
    pub batch_size: i64,
    /// Sleep after a cycle that found nothing to publish
    pub poll_interval: Duration,
    /// Consecutive transient failures tolerated before giving up (0 = never)
    pub max_consecutive_failures: u32,
    pub failure_backoff_initial: Duration,
    pub failure_backoff_max: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            poll_interval: Duration::from_secs(1),
            max_consecutive_failures: 10,
            failure_backoff_initial: Duration::from_secs(1),
            failure_backoff_max: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing unpublished; the (empty) transaction was committed
    Idle,
    /// A batch was delivered and marked
    Published {
        fetched: usize,
        delivered: usize,
        marked: u64,
    },
}

/// Resolves once shutdown has been requested. Never resolves if the sender is
/// gone without having requested it.
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub struct OutboxPoller<S: OutboxStore, P: EventPublisher> {
    store: Arc<S>,
    publisher: Arc<P>,
    config: PollerConfig,
    shutdown: watch::Receiver<bool>,
    metrics: Option<OutboxMetrics>,
    total_sent: u64,
}

impl<S: OutboxStore, P: EventPublisher> OutboxPoller<S, P> {
    pub fn new(
        store: Arc<S>,
        publisher: Arc<P>,
        config: PollerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
            shutdown,
            metrics: None,
            total_sent: 0,
        }
    }

    /// Also update Prometheus metrics every cycle.
    pub fn with_metrics(mut self, metrics: OutboxMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Rows marked published by this poller since it started
    pub fn total_sent(&self) -> u64 {
        self.total_sent
    }

    /// Run cycles until shutdown is requested.
    ///
    /// Transient failures are retried with exponential backoff; the loop only
    /// returns an error for fatal failures or once `max_consecutive_failures`
    /// transient failures happened in a row.
    pub async fn run(&mut self) -> OutboxResult<()> {
        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_consecutive_failures = self.config.max_consecutive_failures,
            "Outbox poller starting"
        );

        let mut backoff = Backoff::new(
            self.config.failure_backoff_initial,
            self.config.failure_backoff_max,
        );
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = match self.run_cycle().await {
                Ok(CycleOutcome::Idle) => {
                    backoff.record_success();
                    Some(self.config.poll_interval)
                }
                Ok(CycleOutcome::Published { .. }) => {
                    backoff.record_success();
                    None
                }
                Err(OutboxError::Interrupted) => {
                    info!("Shutdown during cycle; in-flight transaction rolled back");
                    break;
                }
                Err(e) if e.is_transient() => {
                    let delay = backoff.record_failure();
                    let failures = backoff.consecutive_failures();
                    error!(
                        error = %e,
                        consecutive_failures = failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "Outbox cycle failed; rows left unpublished"
                    );

                    let limit = self.config.max_consecutive_failures;
                    if limit > 0 && failures >= limit {
                        return Err(OutboxError::TooManyFailures {
                            failures,
                            last: Box::new(e),
                        });
                    }
                    Some(delay)
                }
                Err(e) => {
                    error!(error = %e, "Fatal outbox error");
                    return Err(e);
                }
            };

            self.refresh_pending_metrics().await;

            if let Some(delay) = wait {
                tokio::select! {
                    _ = shutdown_requested(&mut shutdown) => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        info!(total_sent = self.total_sent, "Outbox poller stopped");
        Ok(())
    }

    /// One poll cycle.
    pub async fn run_cycle(&mut self) -> OutboxResult<CycleOutcome> {
        let started = Instant::now();
        let outcome = self.publish_next_batch(started).await;

        if let Some(metrics) = &self.metrics {
            match &outcome {
                Ok(CycleOutcome::Published { marked, .. }) => {
                    metrics.cycles.inc();
                    metrics.published.inc_by(*marked);
                }
                Ok(CycleOutcome::Idle) => metrics.cycles.inc(),
                Err(OutboxError::Interrupted) => {}
                Err(_) => metrics.failed_cycles.inc(),
            }
        }
        outcome
    }

    async fn publish_next_batch(&mut self, started: Instant) -> OutboxResult<CycleOutcome> {
        let mut tx = self.store.begin().await?;

        let rows = match tx.fetch_unpublished(self.config.batch_size).await {
            Ok(rows) => rows,
            Err(e) => return Err(abort(tx, e).await),
        };

        if rows.is_empty() {
            tx.commit().await?;
            debug!("No unpublished rows");
            return Ok(CycleOutcome::Idle);
        }

        let fetched = rows.len();
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let events: Vec<Event> = rows.into_iter().map(OutboxRow::into_event).collect();

        let mut shutdown = self.shutdown.clone();
        let published = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                warn!(fetched, "Shutdown requested while waiting for delivery");
                return Err(abort(tx, OutboxError::Interrupted).await);
            }
            result = self.publisher.publish_batch(&events) => result,
        };

        let report = match published {
            Ok(report) => report,
            Err(e) => return Err(abort(tx, e).await),
        };
        let produced = report.submitted;
        let delivered = match report.into_result() {
            Ok(delivered) => delivered,
            Err(e) => return Err(abort(tx, e).await),
        };

        let marked = match tx.mark_published(&ids).await {
            Ok(marked) => marked,
            Err(e) => return Err(abort(tx, e).await),
        };
        if marked != fetched as u64 {
            let mismatch = OutboxError::MarkMismatch {
                expected: fetched,
                marked,
            };
            return Err(abort(tx, mismatch).await);
        }

        tx.commit().await?;
        self.total_sent += marked;

        info!(
            fetched,
            produced,
            delivered,
            marked_sent = marked,
            first_id = ids.first().copied().unwrap_or_default(),
            last_id = ids.last().copied().unwrap_or_default(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            total_sent = self.total_sent,
            "Cycle OK"
        );

        Ok(CycleOutcome::Published {
            fetched,
            delivered,
            marked,
        })
    }

    async fn refresh_pending_metrics(&self) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        match self.store.pending_stats().await {
            Ok((pending, age)) => {
                metrics.pending.set(pending);
                metrics.oldest_pending_age_seconds.set(age);
            }
            Err(e) => debug!(error = %e, "Failed to refresh pending stats"),
        }
    }
}

/// Roll back and hand back the error that caused it.
async fn abort<T: OutboxTransaction>(tx: T, cause: OutboxError) -> OutboxError {
    if let Err(e) = tx.rollback().await {
        // The transaction still ends when the connection drops it.
        error!(error = %e, cause = %cause, "Rollback failed");
    }
    cause
}

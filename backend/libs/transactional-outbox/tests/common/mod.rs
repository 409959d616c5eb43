//! In-memory outbox store and publisher used by the poller tests.
//!
//! The store mimics the row-locking behaviour of `FOR UPDATE SKIP LOCKED`:
//! rows fetched by an open transaction are invisible to other transactions
//! until it commits or rolls back, and a dropped transaction releases them.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use event_schema::Event;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use transactional_outbox::{
    DeliveryReport, EventPublisher, OutboxError, OutboxResult, OutboxRow, OutboxStore,
    OutboxTransaction,
};

pub fn row(id: i64) -> OutboxRow {
    OutboxRow {
        id,
        user_id: id * 10,
        event_type: "login".to_string(),
        event_time: Utc.with_ymd_and_hms(2026, 1, 11, 10, 0, 0).unwrap(),
        payload: serde_json::json!({ "ip": "10.0.0.1" }),
        published: false,
    }
}

#[derive(Default)]
struct StoreState {
    rows: BTreeMap<i64, OutboxRow>,
    locked: HashSet<i64>,
    commits: usize,
    rollbacks: usize,
    fail_next_commit: bool,
    short_next_mark: bool,
}

#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<StoreState>>,
}

impl FakeStore {
    pub fn with_rows(ids: &[i64]) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            for &id in ids {
                state.rows.insert(id, row(id));
            }
        }
        store
    }

    pub fn insert(&self, id: i64) {
        self.state.lock().unwrap().rows.insert(id, row(id));
    }

    pub fn published_ids(&self) -> Vec<i64> {
        self.ids_where(true)
    }

    pub fn unpublished_ids(&self) -> Vec<i64> {
        self.ids_where(false)
    }

    fn ids_where(&self, published: bool) -> Vec<i64> {
        let state = self.state.lock().unwrap();
        state
            .rows
            .values()
            .filter(|row| row.published == published)
            .map(|row| row.id)
            .collect()
    }

    pub fn locked_count(&self) -> usize {
        self.state.lock().unwrap().locked.len()
    }

    pub fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.state.lock().unwrap().rollbacks
    }

    /// Next commit fails as if the connection dropped after delivery.
    pub fn fail_next_commit(&self) {
        self.state.lock().unwrap().fail_next_commit = true;
    }

    /// Next mark-published reports one row fewer than requested.
    pub fn short_next_mark(&self) {
        self.state.lock().unwrap().short_next_mark = true;
    }
}

#[async_trait]
impl OutboxStore for FakeStore {
    type Tx = FakeTx;

    async fn begin(&self) -> OutboxResult<FakeTx> {
        Ok(FakeTx {
            state: Arc::clone(&self.state),
            locked: Vec::new(),
            marks: Vec::new(),
            finished: false,
        })
    }

    async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
        Ok((self.unpublished_ids().len() as i64, 0))
    }
}

pub struct FakeTx {
    state: Arc<Mutex<StoreState>>,
    locked: Vec<i64>,
    marks: Vec<i64>,
    finished: bool,
}

impl FakeTx {
    fn release(&mut self, state: &mut StoreState) {
        for id in self.locked.drain(..) {
            state.locked.remove(&id);
        }
        self.marks.clear();
        self.finished = true;
    }
}

#[async_trait]
impl OutboxTransaction for FakeTx {
    async fn fetch_unpublished(&mut self, limit: i64) -> OutboxResult<Vec<OutboxRow>> {
        let mut state = self.state.lock().unwrap();
        let rows: Vec<OutboxRow> = state
            .rows
            .values()
            .filter(|row| !row.published && !state.locked.contains(&row.id))
            .take(limit as usize)
            .cloned()
            .collect();
        for row in &rows {
            state.locked.insert(row.id);
            self.locked.push(row.id);
        }
        Ok(rows)
    }

    async fn mark_published(&mut self, ids: &[i64]) -> OutboxResult<u64> {
        let mut state = self.state.lock().unwrap();
        let mut marked: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| self.locked.contains(id))
            .collect();
        if state.short_next_mark {
            state.short_next_mark = false;
            marked.pop();
        }
        let count = marked.len() as u64;
        self.marks.extend(marked);
        Ok(count)
    }

    async fn commit(mut self) -> OutboxResult<()> {
        let state = Arc::clone(&self.state);
        let mut state = state.lock().unwrap();
        if state.fail_next_commit {
            state.fail_next_commit = false;
            self.release(&mut state);
            return Err(OutboxError::DatabaseError(sqlx::Error::Protocol(
                "connection reset during commit".to_string(),
            )));
        }
        for id in &self.marks {
            if let Some(row) = state.rows.get_mut(id) {
                row.published = true;
            }
        }
        state.commits += 1;
        self.release(&mut state);
        Ok(())
    }

    async fn rollback(mut self) -> OutboxResult<()> {
        let state = Arc::clone(&self.state);
        let mut state = state.lock().unwrap();
        state.rollbacks += 1;
        self.release(&mut state);
        Ok(())
    }
}

impl Drop for FakeTx {
    fn drop(&mut self) {
        if !self.finished {
            let state = Arc::clone(&self.state);
            let mut state = state.lock().unwrap();
            self.release(&mut state);
        }
    }
}

/// What the fake broker does with the next batch.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Acknowledge everything
    Ack,
    /// Reject this event, acknowledge the rest
    Reject(i64),
    /// Leave the last `n` messages without a delivery report
    Unacked(usize),
    /// Fail before submitting anything
    Unavailable,
    /// Never return
    Hang,
}

#[derive(Default)]
pub struct FakePublisher {
    script: Mutex<VecDeque<Delivery>>,
    log: Mutex<Vec<Event>>,
    calls: AtomicUsize,
}

impl FakePublisher {
    pub fn scripted(steps: impl IntoIterator<Item = Delivery>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Event ids acknowledged by the broker, in delivery order.
    pub fn delivered_ids(&self) -> Vec<i64> {
        self.log.lock().unwrap().iter().map(|e| e.event_id).collect()
    }

    pub fn delivered(&self) -> Vec<Event> {
        self.log.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventPublisher for FakePublisher {
    async fn publish_batch(&self, events: &[Event]) -> OutboxResult<DeliveryReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Delivery::Ack);

        let mut report = DeliveryReport {
            submitted: events.len(),
            ..DeliveryReport::default()
        };
        match step {
            Delivery::Ack => {
                for event in events {
                    self.log.lock().unwrap().push(event.clone());
                    report.record_delivered();
                }
            }
            Delivery::Reject(event_id) => {
                for event in events {
                    if event.event_id == event_id {
                        report.record_failure(event_id, "Broker: Not enough in-sync replicas");
                    } else {
                        self.log.lock().unwrap().push(event.clone());
                        report.record_delivered();
                    }
                }
            }
            Delivery::Unacked(n) => {
                let acked = events.len().saturating_sub(n);
                for event in &events[..acked] {
                    self.log.lock().unwrap().push(event.clone());
                    report.record_delivered();
                }
            }
            Delivery::Unavailable => {
                return Err(OutboxError::KafkaError(
                    rdkafka::error::KafkaError::MessageProduction(
                        rdkafka::types::RDKafkaErrorCode::AllBrokersDown,
                    ),
                ));
            }
            Delivery::Hang => std::future::pending::<()>().await,
        }
        Ok(report)
    }
}

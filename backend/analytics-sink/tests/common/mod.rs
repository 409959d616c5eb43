//! In-memory broker source and analytical store for sink tests.

#![allow(dead_code)]

use analytics_sink::{
    AnalyticalRow, AnalyticalStore, MessageSource, OffsetTracker, SinkError, SinkResult,
    SourceMessage,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use event_schema::Event;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOPIC: &str = "user_logins";

pub fn event(event_id: i64) -> Event {
    Event {
        event_id,
        user_id: 7,
        event_type: "login".to_string(),
        event_time: Utc.with_ymd_and_hms(2026, 1, 11, 10, 12, 13).unwrap(),
        payload: serde_json::json!({ "ip": "10.0.0.1" }),
    }
}

#[derive(Default)]
struct SourceState {
    log: Vec<SourceMessage>,
    next_offset: BTreeMap<i32, i64>,
    cursor: usize,
    committed: BTreeMap<i32, i64>,
    commit_calls: usize,
    fail_next_commit: bool,
    fail_next_poll: bool,
    closed: bool,
}

/// Partitioned log with committed positions, like a consumer group member.
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<SourceState>>,
}

impl FakeSource {
    pub fn push_event(&self, partition: i32, event: &Event) {
        let message = event.to_broker_message().unwrap();
        self.push_raw(partition, Some(message.value.as_bytes()));
    }

    pub fn push_raw(&self, partition: i32, payload: Option<&[u8]>) {
        let mut state = self.state.lock().unwrap();
        let offset = *state.next_offset.entry(partition).or_insert(0);
        state.next_offset.insert(partition, offset + 1);
        state.log.push(SourceMessage {
            topic: TOPIC.to_string(),
            partition,
            offset,
            payload: payload.map(<[u8]>::to_vec),
        });
    }

    /// Committed position (next offset to read) of `partition`
    pub fn committed(&self, partition: i32) -> Option<i64> {
        self.state.lock().unwrap().committed.get(&partition).copied()
    }

    pub fn commit_calls(&self) -> usize {
        self.state.lock().unwrap().commit_calls
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn is_drained(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.cursor >= state.log.len()
    }

    pub fn fail_next_commit(&self) {
        self.state.lock().unwrap().fail_next_commit = true;
    }

    pub fn fail_next_poll(&self) {
        self.state.lock().unwrap().fail_next_poll = true;
    }

    /// Rejoin after a restart: redeliver everything past the committed positions.
    pub fn reopen(&self) {
        let mut state = self.state.lock().unwrap();
        state.cursor = 0;
        state.closed = false;
    }
}

#[async_trait]
impl MessageSource for FakeSource {
    async fn poll(&mut self, timeout: Duration) -> SinkResult<Option<SourceMessage>> {
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_next_poll {
                state.fail_next_poll = false;
                return Err(SinkError::Kafka(rdkafka::error::KafkaError::MessageConsumption(
                    rdkafka::types::RDKafkaErrorCode::AllBrokersDown,
                )));
            }
            while state.cursor < state.log.len() {
                let message = state.log[state.cursor].clone();
                state.cursor += 1;
                let committed = state.committed.get(&message.partition).copied().unwrap_or(0);
                if message.offset >= committed {
                    return Ok(Some(message));
                }
            }
        }
        tokio::time::sleep(timeout).await;
        Ok(None)
    }

    async fn commit(&mut self, offsets: &OffsetTracker) -> SinkResult<()> {
        let mut state = self.state.lock().unwrap();
        state.commit_calls += 1;
        if state.fail_next_commit {
            state.fail_next_commit = false;
            return Err(SinkError::Commit(rdkafka::error::KafkaError::ConsumerCommit(
                rdkafka::types::RDKafkaErrorCode::RequestTimedOut,
            )));
        }
        for (_, partition, position) in offsets.commit_positions() {
            state.committed.insert(partition, position);
        }
        Ok(())
    }

    async fn close(&mut self) -> SinkResult<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

#[derive(Default)]
struct StoreState {
    rows: Vec<AnalyticalRow>,
    insert_calls: usize,
    failing_inserts: usize,
}

/// Append-only table whose deduplicated view keeps the latest ingestion.
#[derive(Clone, Default)]
pub struct FakeAnalyticalStore {
    state: Arc<Mutex<StoreState>>,
}

impl FakeAnalyticalStore {
    /// Fail the next `n` inserts
    pub fn fail_inserts(&self, n: usize) {
        self.state.lock().unwrap().failing_inserts = n;
    }

    pub fn insert_calls(&self) -> usize {
        self.state.lock().unwrap().insert_calls
    }

    /// Every inserted row, duplicates included
    pub fn raw_rows(&self) -> Vec<AnalyticalRow> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn raw_ids(&self) -> Vec<i64> {
        self.raw_rows().iter().map(|row| row.event_id).collect()
    }

    /// What a `FINAL` read would return for `event_id`
    pub fn deduplicated(&self, event_id: i64) -> Vec<AnalyticalRow> {
        let state = self.state.lock().unwrap();
        let mut latest: Option<&AnalyticalRow> = None;
        for row in state.rows.iter().filter(|row| row.event_id == event_id) {
            if latest.map_or(true, |current| row.ingested_at >= current.ingested_at) {
                latest = Some(row);
            }
        }
        latest.into_iter().cloned().collect()
    }
}

#[async_trait]
impl AnalyticalStore for FakeAnalyticalStore {
    async fn ensure_schema(&self) -> SinkResult<()> {
        Ok(())
    }

    async fn insert_batch(&self, rows: &[AnalyticalRow]) -> SinkResult<()> {
        let mut state = self.state.lock().unwrap();
        state.insert_calls += 1;
        if state.failing_inserts > 0 {
            state.failing_inserts -= 1;
            return Err(SinkError::ClickHouse(clickhouse::error::Error::Custom(
                "Connection refused".to_string(),
            )));
        }
        state.rows.extend_from_slice(rows);
        Ok(())
    }
}

//! ClickHouse store tests.
//!
//! Prerequisites:
//! - ClickHouse reachable over HTTP
//! - Environment variables: CH_URL, CH_USER, CH_PASSWORD (defaults point at a local server)
//!
//! Run tests:
//! ```bash
//! cargo test --package analytics-sink --test clickhouse_test -- --ignored
//! ```

use analytics_sink::{AnalyticalRow, AnalyticalStore, ClickHouseStore};
use chrono::{Duration, TimeZone, Utc};
use config_core::ClickHouseConfig;
use event_schema::Event;

fn test_config() -> ClickHouseConfig {
    let mut config = ClickHouseConfig::from_env().expect("valid CH_* variables");
    config.database = "analytics_test".to_string();
    config
}

fn event(event_id: i64, event_type: &str) -> Event {
    Event {
        event_id,
        user_id: 7,
        event_type: event_type.to_string(),
        event_time: Utc.with_ymd_and_hms(2026, 1, 11, 10, 12, 13).unwrap(),
        payload: serde_json::json!({ "ip": "10.0.0.1" }),
    }
}

#[ignore = "Requires ClickHouse server"]
#[tokio::test]
async fn test_reinsert_is_deduplicated_by_event_id() {
    let store = ClickHouseStore::new(&test_config());
    store.ensure_schema().await.unwrap();
    // Idempotent
    store.ensure_schema().await.unwrap();

    let event_id = Utc::now().timestamp_micros();
    let first_at = Utc::now();
    let first = AnalyticalRow::from_event(&event(event_id, "login"), first_at).unwrap();
    let second =
        AnalyticalRow::from_event(&event(event_id, "relogin"), first_at + Duration::seconds(1))
            .unwrap();

    store.insert_batch(&[first]).await.unwrap();
    store.insert_batch(&[second.clone()]).await.unwrap();

    let rows = store.deduplicated_rows(event_id).await.unwrap();
    assert_eq!(rows, vec![second]);
}

#[ignore = "Requires ClickHouse server"]
#[tokio::test]
async fn test_empty_batch_is_a_no_op() {
    let store = ClickHouseStore::new(&test_config());
    store.ensure_schema().await.unwrap();
    store.insert_batch(&[]).await.unwrap();
}

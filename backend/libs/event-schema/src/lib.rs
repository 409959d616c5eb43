//! Event schema shared by the outbox poller and the analytics sink
//!
//! One event type travels through the pipeline: a row written by the application
//! into the outbox table, published to Kafka as a JSON document keyed by its id,
//! and finally stored in ClickHouse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod message;
pub mod time;

// Re-export commonly used types
pub use message::BrokerMessage;
pub use time::parse_event_time;

/// Errors raised while encoding or decoding events.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Message arrived without a body
    #[error("message has no payload")]
    EmptyPayload,

    /// Body is not a valid event document
    #[error("invalid event document: {0}")]
    Json(#[from] serde_json::Error),
}

/// The unit of data moved through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Outbox primary key; unique and the dedup key downstream
    pub event_id: i64,
    pub user_id: i64,
    pub event_type: String,
    /// When the event logically happened (not when it was processed)
    #[serde(with = "time::serde_event_time")]
    pub event_time: DateTime<Utc>,
    /// Opaque document carried alongside the event
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Event {
    /// Partition key: the decimal `event_id`, so every copy of one event lands
    /// on the same partition.
    pub fn partition_key(&self) -> String {
        self.event_id.to_string()
    }

    /// Encode as a broker message
    pub fn to_broker_message(&self) -> Result<BrokerMessage, EventError> {
        Ok(BrokerMessage {
            key: self.partition_key(),
            value: serde_json::to_string(self)?,
        })
    }

    /// Decode a broker message body.
    pub fn decode(payload: Option<&[u8]>) -> Result<Self, EventError> {
        let bytes = payload.ok_or(EventError::EmptyPayload)?;
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn login(event_id: i64) -> Event {
        Event {
            event_id,
            user_id: 7,
            event_type: "login".to_string(),
            event_time: Utc.with_ymd_and_hms(2026, 1, 11, 10, 12, 13).unwrap(),
            payload: json!({"ip": "10.0.0.1"}),
        }
    }

    #[test]
    fn test_broker_message_is_keyed_by_event_id() {
        let message = login(42).to_broker_message().unwrap();
        assert_eq!(message.key, "42");

        let value: serde_json::Value = serde_json::from_str(&message.value).unwrap();
        assert_eq!(value["event_id"], 42);
        assert_eq!(value["user_id"], 7);
        assert_eq!(value["event_type"], "login");
        assert_eq!(value["event_time"], "2026-01-11T10:12:13Z");
        assert_eq!(value["payload"]["ip"], "10.0.0.1");
    }

    #[test]
    fn test_decode_what_we_encode() {
        let event = login(5);
        let message = event.to_broker_message().unwrap();
        let decoded = Event::decode(Some(message.value.as_bytes())).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_missing_payload_defaults_to_empty_object() {
        let body: &[u8] = br#"{"event_id":1,"user_id":2,"event_type":"logout","event_time":"2026-01-11T10:12:13+00:00"}"#;
        let event = Event::decode(Some(body)).unwrap();
        assert_eq!(event.payload, json!({}));
    }

    #[test]
    fn test_offsetless_time_is_utc() {
        let body: &[u8] = br#"{"event_id":1,"user_id":2,"event_type":"login","event_time":"2026-01-11T10:12:13.250000"}"#;
        let event = Event::decode(Some(body)).unwrap();
        assert_eq!(
            event.event_time,
            Utc.with_ymd_and_hms(2026, 1, 11, 10, 12, 13).unwrap()
                + chrono::Duration::milliseconds(250)
        );
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(Event::decode(None), Err(EventError::EmptyPayload)));
        assert!(matches!(
            Event::decode(Some(&b"not json"[..])),
            Err(EventError::Json(_))
        ));

        // missing user_id
        let body: &[u8] = br#"{"event_id":1,"event_type":"login","event_time":"2026-01-11T10:12:13Z"}"#;
        assert!(Event::decode(Some(body)).is_err());

        // malformed timestamp
        let body: &[u8] = br#"{"event_id":1,"user_id":2,"event_type":"login","event_time":"yesterday"}"#;
        assert!(Event::decode(Some(body)).is_err());

        // ids must be integers
        let body: &[u8] = br#"{"event_id":"1","user_id":2,"event_type":"login","event_time":"2026-01-11T10:12:13Z"}"#;
        assert!(Event::decode(Some(body)).is_err());
    }
}

//! Event time parsing
//!
//! Producers are not consistent about offsets: most send RFC 3339 with `Z` or
//! `+00:00`, some send a bare ISO 8601 local timestamp. Bare timestamps are
//! taken as UTC.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an event timestamp, accepting RFC 3339 or offset-less ISO 8601.
pub fn parse_event_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();

    let rfc3339 = DateTime::parse_from_rfc3339(raw);
    if let Ok(dt) = rfc3339 {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    rfc3339.map(|dt| dt.with_timezone(&Utc))
}

pub(crate) mod serde_event_time {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_event_time(&raw)
            .map_err(|e| serde::de::Error::custom(format!("invalid event_time {raw:?}: {e}")))
    }
}

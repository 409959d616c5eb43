//! Analytical store: ClickHouse table with last-write-wins deduplication.
//!
//! Rows sharing an `event_id` are collapsed by `ReplacingMergeTree`, keeping
//! the one with the latest `ingested_at`. Merges happen in the background, so
//! reads that must not see duplicates use `FINAL`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::{Client, Row};
use config_core::ClickHouseConfig;
use event_schema::Event;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::SinkResult;

/// One event as stored in ClickHouse.
#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct AnalyticalRow {
    pub event_id: i64,
    pub user_id: i64,
    pub event_type: String,
    /// `DateTime64(3, 'UTC')`, milliseconds since the epoch
    pub event_time: i64,
    /// Event payload as JSON text
    pub payload: String,
    /// `DateTime64(6, 'UTC')`, microseconds since the epoch
    pub ingested_at: i64,
}

impl AnalyticalRow {
    pub fn from_event(event: &Event, ingested_at: DateTime<Utc>) -> SinkResult<Self> {
        Ok(Self {
            event_id: event.event_id,
            user_id: event.user_id,
            event_type: event.event_type.clone(),
            event_time: event.event_time.timestamp_millis(),
            payload: serde_json::to_string(&event.payload)?,
            ingested_at: ingested_at.timestamp_micros(),
        })
    }

    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.event_time)
    }

    pub fn ingested_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.ingested_at)
    }
}

#[async_trait]
pub trait AnalyticalStore: Send + Sync {
    /// Create the database and table if they do not exist yet.
    async fn ensure_schema(&self) -> SinkResult<()>;

    /// Insert all rows as one INSERT. Nothing is visible if it fails.
    async fn insert_batch(&self, rows: &[AnalyticalRow]) -> SinkResult<()>;
}

pub struct ClickHouseStore {
    /// No default database, so `CREATE DATABASE` works on a fresh server
    admin: Client,
    client: Client,
    database: String,
    table: String,
}

impl ClickHouseStore {
    pub fn new(config: &ClickHouseConfig) -> Self {
        let admin = Client::default()
            .with_url(&config.url)
            .with_user(&config.user)
            .with_password(config.password.expose_secret());
        let client = admin.clone().with_database(&config.database);

        info!(
            url = %config.url,
            database = %config.database,
            table = %config.table,
            "ClickHouse client configured"
        );

        Self {
            admin,
            client,
            database: config.database.clone(),
            table: config.table.clone(),
        }
    }

    fn qualified_table(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }

    /// Rows for `event_id` after deduplication.
    pub async fn deduplicated_rows(&self, event_id: i64) -> SinkResult<Vec<AnalyticalRow>> {
        let sql = format!(
            "SELECT ?fields FROM {} FINAL WHERE event_id = ?",
            self.qualified_table()
        );
        let rows = self
            .client
            .query(&sql)
            .bind(event_id)
            .fetch_all::<AnalyticalRow>()
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl AnalyticalStore for ClickHouseStore {
    async fn ensure_schema(&self) -> SinkResult<()> {
        self.admin
            .query(&format!("CREATE DATABASE IF NOT EXISTS {}", self.database))
            .execute()
            .await?;

        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {}
            (
                event_id    Int64,
                user_id     Int64,
                event_type  String,
                event_time  DateTime64(3, 'UTC'),
                payload     String,
                ingested_at DateTime64(6, 'UTC')
            )
            ENGINE = ReplacingMergeTree(ingested_at)
            ORDER BY event_id
            "#,
            self.qualified_table()
        );
        self.admin.query(&ddl).execute().await?;

        info!(table = %self.qualified_table(), "ClickHouse schema ensured");
        Ok(())
    }

    async fn insert_batch(&self, rows: &[AnalyticalRow]) -> SinkResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut insert = self.client.insert::<AnalyticalRow>(&self.table)?;
        for row in rows {
            insert.write(row).await?;
        }
        insert.end().await?;

        debug!(rows = rows.len(), "Inserted batch");
        Ok(())
    }
}

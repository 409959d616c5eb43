//! Outbox table access.
//!
//! The poller only needs two statements inside one transaction: a locking
//! select of unpublished rows and the mark-published update. Both run on the
//! same connection so the row locks taken by the select are held until the
//! commit (or rollback) that ends the cycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_schema::Event;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use crate::{OutboxError, OutboxResult};

/// An event at rest in the outbox table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OutboxRow {
    pub id: i64,
    pub user_id: i64,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub published: bool,
}

impl OutboxRow {
    pub fn into_event(self) -> Event {
        Event {
            event_id: self.id,
            user_id: self.user_id,
            event_type: self.event_type,
            event_time: self.event_time,
            payload: self.payload,
        }
    }
}

/// Source of outbox transactions.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    type Tx: OutboxTransaction;

    /// Open a transaction for one poll cycle.
    async fn begin(&self) -> OutboxResult<Self::Tx>;

    /// Pending count and oldest pending age in seconds (0 when nothing is pending).
    async fn pending_stats(&self) -> OutboxResult<(i64, i64)>;
}

/// One poll cycle's transaction.
///
/// Dropping a transaction without committing must roll it back.
#[async_trait]
pub trait OutboxTransaction: Send + Sized {
    /// Up to `limit` unpublished rows in id order, skipping rows locked by
    /// other transactions. Returned rows stay locked until the transaction ends.
    async fn fetch_unpublished(&mut self, limit: i64) -> OutboxResult<Vec<OutboxRow>>;

    /// Flag the given rows as published; returns the number of rows updated.
    async fn mark_published(&mut self, ids: &[i64]) -> OutboxResult<u64>;

    async fn commit(self) -> OutboxResult<()>;

    async fn rollback(self) -> OutboxResult<()>;
}

/// PostgreSQL outbox store.
#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
    table: String,
}

impl PgOutboxStore {
    /// Create a store over `table`.
    ///
    /// The table name is spliced into SQL, so it must be a plain identifier.
    pub fn new(pool: PgPool, table: impl Into<String>) -> OutboxResult<Self> {
        let table = table.into();
        config_core::validate_identifier(&table)
            .map_err(|_| OutboxError::ConfigError(format!("invalid outbox table name {table:?}")))?;
        Ok(Self { pool, table })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Replay rows by id range (inclusive) for operational backfill.
    ///
    /// Rows go back to unpublished and are picked up by the next poll cycle.
    pub async fn replay_range(&self, from_id: i64, to_id: i64) -> OutboxResult<u64> {
        let sql = format!(
            "UPDATE {} SET published = FALSE WHERE id BETWEEN $1 AND $2 AND published = TRUE",
            self.table
        );
        let res = sqlx::query(&sql)
            .bind(from_id)
            .bind(to_id)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected())
    }

    /// Replay rows whose event happened at or after `ts`.
    pub async fn replay_since(&self, ts: DateTime<Utc>) -> OutboxResult<u64> {
        let sql = format!(
            "UPDATE {} SET published = FALSE WHERE event_time >= $1 AND published = TRUE",
            self.table
        );
        let res = sqlx::query(&sql).bind(ts).execute(&self.pool).await?;

        Ok(res.rows_affected())
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    type Tx = PgOutboxTransaction;

    async fn begin(&self) -> OutboxResult<Self::Tx> {
        let tx = self.pool.begin().await?;
        Ok(PgOutboxTransaction {
            tx,
            table: self.table.clone(),
        })
    }

    async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
        let sql = format!(
            r#"
            SELECT
                COUNT(*)::BIGINT AS pending,
                COALESCE(EXTRACT(EPOCH FROM (NOW() - MIN(event_time)))::BIGINT, 0) AS age_seconds
            FROM {}
            WHERE published = FALSE
            "#,
            self.table
        );
        let (pending, age): (i64, i64) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok((pending, age.max(0)))
    }
}

/// Transaction holding the row locks of one poll cycle.
pub struct PgOutboxTransaction {
    tx: Transaction<'static, Postgres>,
    table: String,
}

#[async_trait]
impl OutboxTransaction for PgOutboxTransaction {
    async fn fetch_unpublished(&mut self, limit: i64) -> OutboxResult<Vec<OutboxRow>> {
        let sql = format!(
            r#"
            SELECT id, user_id, event_type, event_time, payload, published
            FROM {}
            WHERE published = FALSE
            ORDER BY id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
            self.table
        );
        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?;

        debug!(count = rows.len(), "Fetched unpublished rows");
        Ok(rows)
    }

    async fn mark_published(&mut self, ids: &[i64]) -> OutboxResult<u64> {
        let sql = format!(
            "UPDATE {} SET published = TRUE WHERE id = ANY($1)",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(ids)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self) -> OutboxResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> OutboxResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

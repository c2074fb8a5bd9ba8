use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::errors::StorageError;

/// A single row awaiting (or past) dispatch to Kafka. Written inside the
/// same database transaction as the business change it accompanies, then
/// either produced synchronously and deleted, or left for the polling
/// worker to pick up.
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: Uuid,
    pub message_type: String,
    pub aggregate_id: Option<String>,
    pub partition_key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: Value,
    pub topic: String,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxRow {
    pub fn new(
        message_type: impl Into<String>,
        topic: impl Into<String>,
        payload: Vec<u8>,
        headers: Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            message_type: message_type.into(),
            aggregate_id: None,
            partition_key: None,
            payload,
            headers,
            topic: topic.into(),
            created_at: Utc::now(),
            dispatched_at: None,
        }
    }

    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    pub fn with_aggregate_id(mut self, id: impl Into<String>) -> Self {
        self.aggregate_id = Some(id.into());
        self
    }

    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, StorageError> {
        Ok(Self {
            id: row.try_get("id")?,
            message_type: row.try_get("message_type")?,
            aggregate_id: row.try_get("aggregate_id")?,
            partition_key: row.try_get("partition_key")?,
            payload: row.try_get("payload")?,
            headers: row.try_get("headers")?,
            topic: row.try_get("topic")?,
            created_at: row.try_get("created_at")?,
            dispatched_at: row.try_get("dispatched_at")?,
        })
    }
}

/// Persistence boundary for the outbox, intentionally narrow: writers
/// insert, the polling worker claims/deletes, and nothing else ever reads
/// this table directly.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn insert(&self, tx: &mut Transaction<'_, Postgres>, row: &OutboxRow) -> Result<(), StorageError>;

    /// Claims up to `limit` undispatched rows for the polling worker,
    /// oldest first, skipping rows another worker already holds locked.
    /// The caller is expected to delete each row after a successful
    /// produce and commit the transaction once the whole batch is handled.
    async fn claim_batch(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        limit: i64,
    ) -> Result<Vec<OutboxRow>, StorageError>;

    /// Atomically reserves a single row for an immediate, synchronous
    /// produce attempt. Returns `None` if the row doesn't exist or was
    /// already reserved/dispatched by someone else.
    async fn claim_one(&self, pool: &PgPool, id: Uuid) -> Result<Option<OutboxRow>, StorageError>;

    /// Releases a row reserved by [`Self::claim_one`] back to the
    /// background worker after a failed synchronous produce attempt.
    async fn release(&self, pool: &PgPool, id: Uuid) -> Result<(), StorageError>;

    async fn delete(&self, tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<(), StorageError>;

    /// Deletes a row claimed via [`Self::claim_one`], outside of any
    /// caller-managed transaction.
    async fn delete_one(&self, pool: &PgPool, id: Uuid) -> Result<(), StorageError>;
}

pub struct SqlxOutboxRepository;

#[async_trait]
impl OutboxRepository for SqlxOutboxRepository {
    async fn insert(&self, tx: &mut Transaction<'_, Postgres>, row: &OutboxRow) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO outbox_messages \
             (id, message_type, aggregate_id, partition_key, payload, headers, topic, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(row.id)
        .bind(&row.message_type)
        .bind(&row.aggregate_id)
        .bind(&row.partition_key)
        .bind(&row.payload)
        .bind(&row.headers)
        .bind(&row.topic)
        .bind(row.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn claim_batch(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        limit: i64,
    ) -> Result<Vec<OutboxRow>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, message_type, aggregate_id, partition_key, payload, headers, topic, \
                    created_at, dispatched_at \
             FROM outbox_messages \
             WHERE dispatched_at IS NULL \
             ORDER BY created_at, id \
             LIMIT $1 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(limit)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(OutboxRow::from_row).collect()
    }

    async fn claim_one(&self, pool: &PgPool, id: Uuid) -> Result<Option<OutboxRow>, StorageError> {
        let row = sqlx::query(
            "UPDATE outbox_messages SET dispatched_at = now() \
             WHERE id = $1 AND dispatched_at IS NULL \
             RETURNING id, message_type, aggregate_id, partition_key, payload, headers, topic, \
                       created_at, dispatched_at",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        row.as_ref().map(OutboxRow::from_row).transpose()
    }

    async fn release(&self, pool: &PgPool, id: Uuid) -> Result<(), StorageError> {
        sqlx::query("UPDATE outbox_messages SET dispatched_at = NULL WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM outbox_messages WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn delete_one(&self, pool: &PgPool, id: Uuid) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM outbox_messages WHERE id = $1").bind(id).execute(pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_row_carries_no_partition_key_by_default() {
        let row = OutboxRow::new("Order", "orders", b"{}".to_vec(), Value::Null);
        assert!(row.partition_key.is_none());
        assert!(row.dispatched_at.is_none());
    }

    #[test]
    fn builder_methods_set_optional_fields() {
        let row = OutboxRow::new("Order", "orders", b"{}".to_vec(), Value::Null)
            .with_partition_key("order-42")
            .with_aggregate_id("42");
        assert_eq!(row.partition_key.as_deref(), Some("order-42"));
        assert_eq!(row.aggregate_id.as_deref(), Some("42"));
    }
}

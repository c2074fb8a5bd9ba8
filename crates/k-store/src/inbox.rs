use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::errors::StorageError;

#[derive(Debug, Clone)]
pub struct InboxRow {
    pub hash_id: i64,
    pub received_at: DateTime<Utc>,
}

/// Computes the deduplication hash for a message: an xxHash64 digest of the
/// message type name (the type salt) followed by the JSON-encoded
/// deduplication key, so the same key value under two different message
/// types never collides. Stored as a signed 64-bit integer (`BIGINT`); the
/// bit pattern is preserved, only the type changes.
pub fn fingerprint<K: Serialize>(message_type: &str, key: &K) -> Result<i64, StorageError> {
    let key_bytes = serde_json::to_vec(key).map_err(StorageError::Encode)?;
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(message_type.as_bytes());
    hasher.write(&key_bytes);
    Ok(hasher.finish() as i64)
}

#[async_trait]
pub trait InboxRepository: Send + Sync {
    /// Inserts a hash id if it isn't already present. Returns `true` if
    /// this call performed the insert (i.e. the message is new), `false`
    /// if it was already recorded (a duplicate delivery).
    async fn insert_if_absent(&self, pool: &PgPool, hash_id: i64) -> Result<bool, StorageError>;

    async fn cleanup_expired(&self, pool: &PgPool, older_than: DateTime<Utc>) -> Result<u64, StorageError>;

    /// Transactional counterpart of [`Self::insert_if_absent`], used when
    /// the inbox ledger write must land in the same transaction as the
    /// consumer's own business-table write.
    async fn insert_if_absent_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        hash_id: i64,
    ) -> Result<bool, StorageError>;
}

pub struct SqlxInboxRepository;

#[async_trait]
impl InboxRepository for SqlxInboxRepository {
    async fn insert_if_absent(&self, pool: &PgPool, hash_id: i64) -> Result<bool, StorageError> {
        let result =
            sqlx::query("INSERT INTO inbox_messages (hash_id) VALUES ($1) ON CONFLICT (hash_id) DO NOTHING")
                .bind(hash_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn cleanup_expired(&self, pool: &PgPool, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM inbox_messages WHERE received_at < $1")
            .bind(older_than)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_if_absent_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        hash_id: i64,
    ) -> Result<bool, StorageError> {
        let result =
            sqlx::query("INSERT INTO inbox_messages (hash_id) VALUES ($1) ON CONFLICT (hash_id) DO NOTHING")
                .bind(hash_id)
                .execute(&mut **tx)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint("Order", &json!({"id": 1})).unwrap();
        let b = fingerprint("Order", &json!({"id": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_across_message_types() {
        let a = fingerprint("Order", &json!({"id": 1})).unwrap();
        let b = fingerprint("Invoice", &json!({"id": 1})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_differs_across_keys() {
        let a = fingerprint("Order", &json!({"id": 1})).unwrap();
        let b = fingerprint("Order", &json!({"id": 2})).unwrap();
        assert_ne!(a, b);
    }
}

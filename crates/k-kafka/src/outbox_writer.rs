use std::sync::Arc;

use k_core::{ClientConfig, Envelope, OutboxDispatchStrategy, SerializationRegistry};
use k_store::{OutboxRepository, OutboxRow};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};

use crate::errors::DispatchError;
use crate::producer::KafkaProducer;

/// Resolves the Kafka topic a message type is written to. Kept as a
/// closure rather than a fixed naming convention so applications can
/// route several message types to the same topic when they need to
/// preserve ordering across types that share a partition key.
pub type TopicResolver<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Builds and inserts [`OutboxRow`]s inside the caller's own transaction
///, and, for [`OutboxDispatchStrategy::ImmediateWithFallback`],
/// attempts a synchronous produce right after the transaction commits.
pub struct OutboxWriter<T> {
    registry: Arc<SerializationRegistry>,
    topic: TopicResolver<T>,
    outbox: Arc<dyn OutboxRepository>,
    strategy: OutboxDispatchStrategy,
}

impl<T: Serialize + Send + Sync + 'static> OutboxWriter<T> {
    pub fn new(
        registry: Arc<SerializationRegistry>,
        topic: TopicResolver<T>,
        outbox: Arc<dyn OutboxRepository>,
        config: &ClientConfig,
    ) -> Self {
        Self { registry, topic, outbox, strategy: config.outbox.strategy }
    }

    /// Encodes `envelope` into the [`OutboxRow`] that should be inserted
    /// for it. Pure (no I/O) so application command handlers can call it
    /// without needing a reference to the outbox repository themselves —
    /// they hand the row to their own unit of work alongside their
    /// business-table writes.
    pub fn build_row(&self, envelope: &Envelope<T>) -> Result<OutboxRow, DispatchError>
    where
        T: 'static,
    {
        let data = envelope.data.as_ref().expect("producer-side envelope always carries data");
        let payload = self.registry.encode(data)?;
        let topic = (self.topic)(data);
        let headers = serde_json::to_value(&envelope.headers).unwrap_or_default();

        let mut row = OutboxRow::new(std::any::type_name::<T>(), topic, payload, headers);
        if let Some(key) = &envelope.key {
            row = row.with_partition_key(key.clone());
        }
        Ok(row)
    }

    /// Convenience wrapper combining [`Self::build_row`] with a direct
    /// insert, for callers that already hold the transaction and don't go
    /// through a [`k_store::Command`].
    pub async fn enqueue(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        envelope: &Envelope<T>,
    ) -> Result<OutboxRow, DispatchError>
    where
        T: 'static,
    {
        let row = self.build_row(envelope)?;
        self.outbox.insert(tx, &row).await?;
        Ok(row)
    }

    pub fn strategy(&self) -> OutboxDispatchStrategy {
        self.strategy
    }

    /// Called after the enqueueing transaction has committed. Attempts an
    /// atomic claim followed by a synchronous produce; on any failure
    /// (claim lost to a concurrent dispatcher, or the produce itself
    /// failing) the row is left for the background worker.
    pub async fn dispatch_if_immediate(
        &self,
        pool: &PgPool,
        producer: &KafkaProducer,
        row: &OutboxRow,
    ) -> Result<(), DispatchError> {
        if self.strategy != OutboxDispatchStrategy::ImmediateWithFallback {
            return Ok(());
        }

        let Some(claimed) = self.outbox.claim_one(pool, row.id).await? else {
            return Ok(());
        };

        let headers: Vec<(String, String)> = claimed
            .headers
            .as_object()
            .map(|obj| obj.iter().filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string()))).collect())
            .unwrap_or_default();
        let header_refs: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        match producer
            .send(&claimed.topic, claimed.partition_key.as_deref(), &claimed.payload, &header_refs)
            .await
        {
            Ok(_) => {
                self.outbox.delete_one(pool, claimed.id).await?;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, id = %claimed.id, "immediate dispatch failed, falling back to background worker");
                self.outbox.release(pool, claimed.id).await?;
                Ok(())
            }
        }
    }
}

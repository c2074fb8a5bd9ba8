use std::sync::Arc;

use async_trait::async_trait;
use k_store::InboxRepository;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{Offset, TopicPartitionList};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};

use k_core::{SerializationRegistry, TopicPartitionOffset};

use crate::errors::PipelineError;
use crate::poll_service::RawEnvelope;
use crate::buffer::PerTypeBuffer;

/// Application-supplied business logic run once a message has been
/// deserialized and passed deduplication. Runs inside the same
/// transaction as the inbox ledger write, so the two commit atomically.
#[async_trait]
pub trait ConsumerHandler<T>: Send + Sync {
    async fn handle(&self, tx: &mut Transaction<'_, Postgres>, message: &T) -> Result<(), PipelineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The message was new: the handler ran and its write committed.
    Committed,
    /// The message's fingerprint was already in the inbox ledger; the
    /// handler did not run, but the Kafka offset was still committed.
    DuplicateSkipped,
    /// The payload failed to deserialize. Classified as a serialization
    /// error: the offset is left uncommitted, so the message is redelivered
    /// rather than silently discarded.
    DecodeFailed,
}

/// Drives the per-type consume-side state machine: dequeue a raw
/// envelope, deserialize it, check/record it in the inbox ledger, run the
/// handler, commit the database transaction, and only then commit the
/// Kafka offset — that ordering is fixed and non-negotiable.
pub struct ConsumerPipeline<T> {
    buffer: Arc<PerTypeBuffer<RawEnvelope>>,
    registry: Arc<SerializationRegistry>,
    inbox: Arc<dyn InboxRepository>,
    pool: PgPool,
    consumer: Arc<StreamConsumer>,
    key_fn: Arc<dyn Fn(&T) -> Value + Send + Sync>,
    handler: Arc<dyn ConsumerHandler<T>>,
    message_type: String,
}

impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> ConsumerPipeline<T> {
    pub fn new(
        message_type: impl Into<String>,
        buffer: Arc<PerTypeBuffer<RawEnvelope>>,
        registry: Arc<SerializationRegistry>,
        inbox: Arc<dyn InboxRepository>,
        pool: PgPool,
        consumer: Arc<StreamConsumer>,
        key_fn: Arc<dyn Fn(&T) -> Value + Send + Sync>,
        handler: Arc<dyn ConsumerHandler<T>>,
    ) -> Self {
        Self { buffer, registry, inbox, pool, consumer, key_fn, handler, message_type: message_type.into() }
    }

    /// Blocks until a message is available, then drives it fully through
    /// the pipeline. Intended to be called in a loop by the owning task.
    pub async fn advance(&self) -> Result<PipelineOutcome, PipelineError> {
        let Some((envelope, _signal)) = self.buffer.dequeue().await else {
            return Err(PipelineError::Cancellation);
        };

        let raw = envelope.raw_payload.as_deref().unwrap_or_default();
        let data: T = match self.registry.decode(raw) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    message_type = %self.message_type,
                    "failed to decode message, leaving offset uncommitted for redelivery"
                );
                return Ok(PipelineOutcome::DecodeFailed);
            }
        };

        let key = (self.key_fn)(&data);
        let hash_id = k_store::fingerprint(&self.message_type, &key)?;

        let mut tx = self.pool.begin().await.map_err(k_store::StorageError::from)?;
        let is_new = self.inbox.insert_if_absent_tx(&mut tx, hash_id).await?;

        let outcome = if is_new {
            self.handler.handle(&mut tx, &data).await?;
            PipelineOutcome::Committed
        } else {
            PipelineOutcome::DuplicateSkipped
        };

        tx.commit().await.map_err(k_store::StorageError::from)?;
        self.commit_offset(&envelope.topic_partition_offset)?;

        Ok(outcome)
    }

    fn commit_offset(&self, tpo: &Option<TopicPartitionOffset>) -> Result<(), PipelineError> {
        let Some(tpo) = tpo else { return Ok(()) };
        let mut tpl = TopicPartitionList::new();
        let _ = tpl.add_partition_offset(&tpo.topic, tpo.partition, Offset::Offset(tpo.offset + 1));
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| PipelineError::Fatal(anyhow::anyhow!(e)))
    }
}

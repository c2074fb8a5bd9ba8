use std::sync::Arc;
use std::time::Duration;

use k_core::ClientConfig;
use k_store::OutboxRepository;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::errors::DispatchError;
use crate::lease::ExclusivityLease;
use crate::producer::KafkaProducer;

/// Polls the outbox table for undispatched rows and produces them to
/// Kafka. Only runs its claim/produce/delete cycle while it holds the
/// exclusivity lease, so at most one process is ever dispatching a given
/// row at a time.
///
/// Takes the lease as an `Arc` so a single process can share one lease
/// instance between this worker and an [`crate::cleanup::InboxCleanupTask`]
/// — both gate on the same leadership flag rather than running their own
/// independent rebalance side channels.
pub struct OutboxWorker {
    pool: PgPool,
    outbox: Arc<dyn OutboxRepository>,
    producer: KafkaProducer,
    lease: Arc<ExclusivityLease>,
    batch_size: i64,
    poll_interval: Duration,
}

impl OutboxWorker {
    pub fn new(
        pool: PgPool,
        outbox: Arc<dyn OutboxRepository>,
        producer: KafkaProducer,
        lease: Arc<ExclusivityLease>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            pool,
            outbox,
            producer,
            lease,
            batch_size: config.outbox.batch_size as i64,
            poll_interval: config.outbox.poll_interval,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("outbox worker shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.lease.poll(Duration::from_millis(50));
                    if !self.lease.is_leader() {
                        continue;
                    }
                    if let Err(err) = self.run_once().await {
                        tracing::error!(error = %err, "outbox poll tick failed");
                    }
                }
            }
        }
    }

    async fn run_once(&self) -> Result<usize, DispatchError> {
        let mut tx = self.pool.begin().await.map_err(k_store::StorageError::from)?;
        let rows = self.outbox.claim_batch(&mut tx, self.batch_size).await?;
        let claimed = rows.len();

        for row in &rows {
            let headers: Vec<(String, String)> = row
                .headers
                .as_object()
                .map(|obj| {
                    obj.iter().filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string()))).collect()
                })
                .unwrap_or_default();
            let header_refs: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

            match self.producer.send(&row.topic, row.partition_key.as_deref(), &row.payload, &header_refs).await {
                Ok(_) => {
                    self.outbox.delete(&mut tx, row.id).await?;
                }
                Err(err) => {
                    // Leave the row in place and stop the batch here: later
                    // rows must not dispatch ahead of this one, since
                    // per-producer ordering is createdAt, id.
                    tracing::warn!(error = %err, id = %row.id, "outbox produce failed, stopping batch, will retry next tick");
                    break;
                }
            }
        }

        tx.commit().await.map_err(k_store::StorageError::from)?;
        Ok(claimed)
    }
}

use std::sync::Arc;

use chrono::Utc;
use k_core::InboxSettings;
use k_store::InboxRepository;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::lease::ExclusivityLease;

/// Periodically sweeps expired inbox rows. Gated behind the same
/// exclusivity lease as the outbox worker so only one deployment-wide
/// sweep runs at a time, rather than one per process.
pub struct InboxCleanupTask {
    pool: PgPool,
    inbox: Arc<dyn InboxRepository>,
    lease: Arc<ExclusivityLease>,
    settings: InboxSettings,
}

impl InboxCleanupTask {
    pub fn new(pool: PgPool, inbox: Arc<dyn InboxRepository>, lease: Arc<ExclusivityLease>, settings: InboxSettings) -> Self {
        Self { pool, inbox, lease, settings }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.cleanup_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("inbox cleanup task shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if !self.lease.is_leader() {
                        continue;
                    }
                    let cutoff = Utc::now() - self.settings.retention;
                    match self.inbox.cleanup_expired(&self.pool, cutoff).await {
                        Ok(removed) if removed > 0 => {
                            tracing::info!(removed, "swept expired inbox rows");
                        }
                        Ok(_) => {}
                        Err(err) => tracing::error!(error = %err, "inbox cleanup sweep failed"),
                    }
                }
            }
        }
    }
}

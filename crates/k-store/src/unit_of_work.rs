use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::errors::StorageError;
use crate::outbox::{OutboxRepository, OutboxRow};

/// Stands in for the host ORM's `SaveChanges`/commit hook: a single
/// database transaction in which the caller makes its own business writes
/// and, before committing, enqueues zero or more outbox rows. Both land
/// atomically or not at all, which is what gives the outbox pattern its
/// guarantee.
pub struct UnitOfWork<'a> {
    tx: Transaction<'a, Postgres>,
    outbox: &'a dyn OutboxRepository,
}

impl<'a> UnitOfWork<'a> {
    pub async fn begin(pool: &'a PgPool, outbox: &'a dyn OutboxRepository) -> Result<Self, StorageError> {
        let tx = pool.begin().await?;
        Ok(Self { tx, outbox })
    }

    /// Gives the caller direct access to the transaction for its own
    /// business-table writes.
    pub fn transaction(&mut self) -> &mut Transaction<'a, Postgres> {
        &mut self.tx
    }

    pub async fn enqueue(&mut self, row: &OutboxRow) -> Result<(), StorageError> {
        self.outbox.insert(&mut self.tx, row).await
    }

    pub async fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), StorageError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// A piece of application logic that runs inside a [`UnitOfWork`], writing
/// its own business rows and returning the outbox rows to enqueue
/// alongside them. Kept as a trait (rather than a bare closure) so
/// implementations can hold their own dependencies, mirroring how command
/// handlers are usually structured in this codebase's demo apps.
#[async_trait]
pub trait Command: Send + Sync {
    type Output: Send;

    async fn execute(
        &self,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<(Self::Output, Vec<OutboxRow>), StorageError>;
}

/// Runs `command` inside a fresh unit of work, enqueueing the outbox rows
/// it returns before committing. This is the entry point demo apps use
/// instead of talking to [`UnitOfWork`] directly.
pub async fn run_in_unit_of_work<C: Command>(
    pool: &PgPool,
    outbox: &dyn OutboxRepository,
    command: &C,
) -> Result<C::Output, StorageError> {
    let mut uow = UnitOfWork::begin(pool, outbox).await?;
    let (output, rows) = command.execute(uow.transaction()).await?;
    for row in &rows {
        uow.enqueue(row).await?;
    }
    uow.commit().await?;
    Ok(output)
}

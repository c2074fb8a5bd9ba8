pub mod errors;
pub mod inbox;
pub mod outbox;
pub mod unit_of_work;

pub use errors::StorageError;
pub use inbox::{fingerprint, InboxRepository, InboxRow, SqlxInboxRepository};
pub use outbox::{OutboxRepository, OutboxRow, SqlxOutboxRepository};
pub use unit_of_work::{run_in_unit_of_work, Command, UnitOfWork};

/// Embeds and runs the migrations under `migrations/` against `pool`.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

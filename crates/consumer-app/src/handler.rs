use async_trait::async_trait;
use k_kafka::{ConsumerHandler, PipelineError};
use sqlx::{Postgres, Transaction};
use webhook::domain::Order;

/// Projects each deduplicated [`Order`] into a read-model row. Runs inside
/// the same transaction as the inbox ledger insert, so a crash
/// between this write and the Kafka offset commit only ever costs a
/// redelivery absorbed by the inbox, never a lost or duplicated write here.
pub struct OrderReadModel;

#[async_trait]
impl ConsumerHandler<Order> for OrderReadModel {
    async fn handle(&self, tx: &mut Transaction<'_, Postgres>, message: &Order) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO orders_read_model (id, name) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
        )
        .bind(message.id as i64)
        .bind(&message.name)
        .execute(&mut **tx)
        .await
        .map_err(k_store::StorageError::from)?;
        Ok(())
    }
}

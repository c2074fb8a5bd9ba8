use std::sync::Arc;

use k_kafka::{KafkaProducer, OutboxWriter};
use k_store::OutboxRepository;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::domain::Order;

/// Shared state handed to every axum handler: the database pool the
/// unit-of-work borrows a transaction from, the outbox writer that
/// encodes an [`Order`] into an [`k_store::OutboxRow`], and (for the
/// `ImmediateWithFallback` strategy) the producer used right after commit.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pool: PgPool,
    pub outbox: Arc<dyn OutboxRepository>,
    pub writer: Arc<OutboxWriter<Order>>,
    pub producer: Arc<KafkaProducer>,
}

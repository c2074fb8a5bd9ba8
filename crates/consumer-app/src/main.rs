mod config;
mod errors;
mod handler;

use std::any::type_name;
use std::sync::Arc;

use k_core::SerializationRegistry;
use k_kafka::{ConsumerPipeline, ConsumerPollService, SubscriptionRegistry};
use k_store::SqlxInboxRepository;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use webhook::domain::{Order, ORDER_MESSAGE_TYPE, ORDER_TOPIC};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::handler::OrderReadModel;

/// Wires up the consume-side demo: one poll service reading the `orders`
/// topic, fanning `Order` records into their per-type buffer, and a
/// consumer pipeline that dedupes through the inbox ledger before
/// projecting each order into a read model.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt().with_env_filter("consumer_app=info,k_kafka=info,k_store=info").init();

    let config = AppConfig::from_env()?;
    tracing::info!(group_id = %config.group_id, "configuration loaded");

    let pool = PgPoolOptions::new().max_connections(10).connect(&config.runtime.database_url).await?;
    k_store::run_migrations(&pool).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let inbox: Arc<dyn k_store::InboxRepository> = Arc::new(SqlxInboxRepository);
    let registry = Arc::new(SerializationRegistry::new().with_default_json::<Order>());
    let subscriptions = Arc::new(SubscriptionRegistry::new());

    let mut rd_config = config.runtime.connection.to_rdkafka_config();
    rd_config.set("group.id", &config.group_id);
    rd_config.set("enable.auto.commit", "false");
    rd_config.set("auto.offset.reset", "earliest");

    let poll_service = Arc::new(ConsumerPollService::new(
        &rd_config,
        subscriptions.clone(),
        config.runtime.client.buffer.clone(),
    )?);

    // `$type`/`$runtimeType` headers carry the producer's Rust type path
    // (see webhook::handlers::create_order); `type_name` resolves to the
    // same string here since both crates refer to the same `Order` type.
    let order_type = type_name::<Order>();
    subscriptions.activate::<Order>();
    poll_service.subscribe(&[ORDER_TOPIC])?;
    let buffer = poll_service.buffer_for(order_type);

    let cancel = CancellationToken::new();
    let poll_cancel = cancel.clone();
    let poll_handle = {
        let poll_service = poll_service.clone();
        tokio::spawn(async move { poll_service.run(poll_cancel).await })
    };

    let pipeline = ConsumerPipeline::new(
        ORDER_MESSAGE_TYPE,
        buffer,
        registry,
        inbox,
        pool,
        poll_service.consumer_handle(),
        Arc::new(|order: &Order| serde_json::json!(order.id)),
        Arc::new(OrderReadModel),
    );

    tracing::info!(topic = ORDER_TOPIC, "consumer pipeline started");
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown_cancel.cancel();
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = pipeline.advance() => {
                match outcome {
                    Ok(outcome) => tracing::debug!(?outcome, "message processed"),
                    // A pipeline failure leaves the Kafka offset uncommitted;
                    // the record is redelivered on the next rebalance or
                    // restart, so we log and keep serving the rest of the
                    // partition rather than tearing the process down.
                    Err(err) => tracing::error!(error = %err, "pipeline step failed"),
                }
            }
        }
    }

    subscriptions.deactivate::<Order>();
    cancel.cancel();
    let _ = poll_handle.await;
    Ok(())
}

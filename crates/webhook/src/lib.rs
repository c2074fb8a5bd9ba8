pub mod config;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_route;

use std::sync::Arc;

use k_core::SerializationRegistry;
use k_kafka::{ExclusivityLease, KafkaProducer, OutboxWorker, OutboxWriter};
use k_store::SqlxOutboxRepository;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::domain::{Order, ORDER_TOPIC};
use crate::state::AppState;

/// Wires up the produce-side demo: an axum server accepting `POST /orders`,
/// a background outbox worker draining whatever `BackgroundOnly` leaves
/// behind, and (when configured) `ImmediateWithFallback`'s synchronous fast
/// path. Runs until the process receives `SIGINT`.
pub async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    tracing::info!(strategy = ?config.runtime.client.outbox.strategy, "configuration loaded");

    let pool = PgPoolOptions::new().max_connections(10).connect(&config.runtime.database_url).await?;
    k_store::run_migrations(&pool).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let outbox: Arc<dyn k_store::OutboxRepository> = Arc::new(SqlxOutboxRepository);
    let registry = Arc::new(SerializationRegistry::new().with_default_json::<Order>());
    let topic: k_kafka::outbox_writer::TopicResolver<Order> = Arc::new(|_: &Order| ORDER_TOPIC.to_string());
    let writer = Arc::new(OutboxWriter::new(registry, topic, outbox.clone(), &config.runtime.client));

    let rd_config = config.runtime.connection.to_rdkafka_config();
    let producer = Arc::new(KafkaProducer::new(&rd_config)?);

    let cancel = CancellationToken::new();

    let lease = Arc::new(ExclusivityLease::new(
        &rd_config,
        &config.runtime.client.outbox.exclusive,
        config.runtime.client.use_single_node,
    )?);
    let worker = OutboxWorker::new(
        pool.clone(),
        outbox.clone(),
        KafkaProducer::new(&rd_config)?,
        lease.clone(),
        &config.runtime.client,
    );
    let worker_cancel = cancel.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    let state = AppState { config: config.clone(), pool, outbox, writer, producer };
    let app = routes::create_route(state);

    let addr = config.listen_address();
    tracing::info!(%addr, "webhook server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown_cancel.cancel();
    });

    let serve_cancel = cancel.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            serve_cancel.cancelled().await;
        })
        .await?;

    cancel.cancel();
    let _ = worker_handle.await;
    Ok(())
}

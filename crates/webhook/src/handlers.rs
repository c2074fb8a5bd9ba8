use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use k_core::headers::{HEADER_RUNTIME_TYPE, HEADER_TYPE};
use k_core::Envelope;
use k_store::{Command, OutboxRow};
use sqlx::{Postgres, Transaction};
use std::any::type_name;

use crate::domain::Order;
use crate::errors::AppError;
use crate::state::AppState;

/// Inserts the business row for an [`Order`] alongside the outbox row
/// produced for it, so both land in the same database transaction — the
/// outbox insert is never acknowledged to the application outside the
/// transaction that wrote the business data.
struct InsertOrder {
    order: Order,
    outbox_row: OutboxRow,
}

#[async_trait]
impl Command for InsertOrder {
    type Output = Order;

    async fn execute(
        &self,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<(Self::Output, Vec<OutboxRow>), k_store::StorageError> {
        sqlx::query("INSERT INTO orders (id, name) VALUES ($1, $2)")
            .bind(self.order.id as i64)
            .bind(&self.order.name)
            .execute(&mut **tx)
            .await?;
        Ok((self.order.clone(), vec![self.outbox_row.clone()]))
    }
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(order): Json<Order>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let mut envelope = Envelope::new(order.clone()).with_key(order.partition_key());
    envelope.set_header(HEADER_TYPE, type_name::<Order>());
    envelope.set_header(HEADER_RUNTIME_TYPE, type_name::<Order>());

    let outbox_row = state.writer.build_row(&envelope)?;
    let command = InsertOrder { order: order.clone(), outbox_row: outbox_row.clone() };

    let created = k_store::run_in_unit_of_work(&state.pool, state.outbox.as_ref(), &command).await?;

    state.writer.dispatch_if_immediate(&state.pool, &state.producer, &outbox_row).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

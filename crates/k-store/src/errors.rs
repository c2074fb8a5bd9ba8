use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to encode row payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("outbox row {id} was not found or was already claimed")]
    RowNotClaimed { id: uuid::Uuid },
}

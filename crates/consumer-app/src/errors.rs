use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Configuration(#[from] k_core::ConfigurationError),

    #[error(transparent)]
    Dispatch(#[from] k_kafka::DispatchError),

    #[error(transparent)]
    Storage(#[from] k_store::StorageError),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("kafka producer error: {0}")]
    Producer(#[from] rdkafka::error::KafkaError),

    #[error(transparent)]
    Serialization(#[from] k_core::SerializationError),

    #[error(transparent)]
    Storage(#[from] k_store::StorageError),

    #[error("message queued full, produce timed out after {0:?}")]
    QueueFull(std::time::Duration),
}

/// Internal to the exclusivity lease; never surfaced to application code,
/// only observed via [`crate::lease::ExclusivityLease::is_leader`].
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("kafka consumer error while maintaining lease: {0}")]
    Consumer(#[from] rdkafka::error::KafkaError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Serialization(#[from] k_core::SerializationError),

    #[error(transparent)]
    Storage(#[from] k_store::StorageError),

    #[error(transparent)]
    Middleware(#[from] k_core::MiddlewareError),

    #[error("pipeline cancelled")]
    Cancellation,

    #[error("fatal pipeline error: {0}")]
    Fatal(#[source] anyhow::Error),
}

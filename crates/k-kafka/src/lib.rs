pub mod buffer;
pub mod cleanup;
pub mod config;
pub mod errors;
pub mod lease;
pub mod outbox_worker;
pub mod outbox_writer;
pub mod pipeline;
pub mod poll_service;
pub mod producer;
pub mod subscription_registry;

pub use buffer::{EnqueueOutcome, PerTypeBuffer, WatermarkSignal};
pub use config::{KafkaConnectionSettings, RuntimeConfig};
pub use errors::{DispatchError, LeaseError, PipelineError};
pub use lease::ExclusivityLease;
pub use outbox_worker::OutboxWorker;
pub use outbox_writer::OutboxWriter;
pub use pipeline::{ConsumerHandler, ConsumerPipeline, PipelineOutcome};
pub use poll_service::{ConsumerPollService, RawEnvelope};
pub use producer::KafkaProducer;
pub use subscription_registry::SubscriptionRegistry;

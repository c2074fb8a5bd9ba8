pub mod config;
pub mod envelope;
pub mod headers;
pub mod middleware;
pub mod serialization;

pub use config::{
    BackpressurePolicy, BufferSettings, ClientConfig, ConfigurationError, ConsumerSettings,
    ExclusivitySettings, InboxSettings, OutboxDispatchStrategy, OutboxSettings,
};
pub use envelope::{Envelope, TopicPartitionOffset};
pub use middleware::{
    ConsumerChain, ConsumerMiddleware, ConsumerNext, MiddlewareError, ProducerChain,
    ProducerMiddleware, ProducerNext, Terminal,
};
pub use serialization::{Codec, JsonCodec, SerializationError, SerializationRegistry};

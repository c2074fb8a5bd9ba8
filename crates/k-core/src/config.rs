use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {source}")]
    InvalidValue { var: &'static str, source: Box<dyn std::error::Error + Send + Sync> },

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("high watermark ({high}) must be greater than low watermark ({low})")]
    WatermarkOrdering { high: usize, low: usize },
}

/// How a produce-side outbox write is handed off to Kafka.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxDispatchStrategy {
    /// Only the polling worker ever produces; the synchronous call path
    /// just inserts the row and returns.
    BackgroundOnly,
    /// The synchronous call path attempts to produce immediately (after
    /// atomically claiming the row) and only leaves it for the polling
    /// worker if that attempt fails.
    ImmediateWithFallback,
}

impl Default for OutboxDispatchStrategy {
    fn default() -> Self {
        Self::BackgroundOnly
    }
}

/// What a per-type buffer does when it is full and a new message arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Stop accepting new polls from Kafka for this type until the buffer
    /// drains below the low watermark (the default, and only
    /// loss-free option).
    ApplyBackpressure,
    /// Evict the oldest buffered message to make room for the new one.
    DropOldest,
    /// Reject the new message, keeping the buffer's current contents.
    DropNewest,
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        Self::ApplyBackpressure
    }
}

/// Knobs for the dedicated coordination-group side channel the exclusivity
/// lease (C7) uses to elect a single outbox-dispatching leader.
#[derive(Debug, Clone)]
pub struct ExclusivitySettings {
    pub topic_name: String,
    pub group_id: String,
    pub heartbeat_interval: Duration,
    pub session_timeout: Duration,
}

impl Default for ExclusivitySettings {
    fn default() -> Self {
        Self {
            topic_name: "__k_outbox_exclusive".to_string(),
            group_id: "k-outbox-exclusive".to_string(),
            heartbeat_interval: Duration::from_secs(3),
            session_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboxSettings {
    pub strategy: OutboxDispatchStrategy,
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub exclusive: ExclusivitySettings,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            strategy: OutboxDispatchStrategy::default(),
            batch_size: 100,
            poll_interval: Duration::from_secs(4),
            exclusive: ExclusivitySettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BufferSettings {
    pub capacity: usize,
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub policy: BackpressurePolicy,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self { capacity: 1_000, high_watermark: 800, low_watermark: 500, policy: BackpressurePolicy::default() }
    }
}

impl BufferSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.capacity == 0 {
            return Err(ConfigurationError::MustBePositive("buffer capacity"));
        }
        if self.high_watermark <= self.low_watermark {
            return Err(ConfigurationError::WatermarkOrdering {
                high: self.high_watermark,
                low: self.low_watermark,
            });
        }
        if self.high_watermark > self.capacity {
            return Err(ConfigurationError::InvalidValue {
                var: "high_watermark",
                source: "high watermark cannot exceed buffer capacity".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub group_id: String,
    pub max_poll_records: usize,
    pub session_timeout: Duration,
    pub commit_interval: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            group_id: "k-kafka-consumers".to_string(),
            max_poll_records: 500,
            session_timeout: Duration::from_secs(10),
            commit_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InboxSettings {
    pub retention: Duration,
    pub cleanup_interval: Duration,
}

impl Default for InboxSettings {
    fn default() -> Self {
        Self { retention: Duration::from_secs(24 * 3600), cleanup_interval: Duration::from_secs(3600) }
    }
}

/// Aggregate, process-wide configuration, analogous to the host library's
/// `ClientConfig`. Scoped (per unit-of-work) settings live on the
/// middleware instances constructed from this at startup, not here.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub outbox: OutboxSettings,
    pub buffer: BufferSettings,
    pub consumer: ConsumerSettings,
    pub inbox: InboxSettings,
    pub use_single_node: bool,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.buffer.validate()?;
        if self.outbox.batch_size == 0 {
            return Err(ConfigurationError::MustBePositive("outbox batch size"));
        }
        Ok(())
    }
}

/// Reads an environment variable with a default, parsing it with `FromStr`.
/// Mirrors the `from_env` pattern used throughout this codebase's binaries.
pub fn env_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigurationError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigurationError::InvalidValue {
            var,
            source: Box::new(e),
        }),
        Err(_) => Ok(default),
    }
}

pub fn require_env(var: &'static str) -> Result<String, ConfigurationError> {
    std::env::var(var).map_err(|_| ConfigurationError::MissingVar(var))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buffer_settings_validate() {
        assert!(BufferSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_watermarks() {
        let settings = BufferSettings { capacity: 100, high_watermark: 10, low_watermark: 50, ..Default::default() };
        assert!(matches!(settings.validate(), Err(ConfigurationError::WatermarkOrdering { .. })));
    }

    #[test]
    fn rejects_zero_capacity() {
        let settings = BufferSettings { capacity: 0, ..Default::default() };
        assert!(matches!(settings.validate(), Err(ConfigurationError::MustBePositive(_))));
    }

    #[test]
    fn env_or_falls_back_to_default_when_unset() {
        std::env::remove_var("K_CORE_TEST_MISSING_VAR");
        let value: u32 = env_or("K_CORE_TEST_MISSING_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }
}

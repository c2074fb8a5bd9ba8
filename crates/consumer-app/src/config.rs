use k_core::config::env_or;
use k_core::ConfigurationError;
use k_kafka::RuntimeConfig;

/// Consumer-side configuration layered on top of [`RuntimeConfig`]'s
/// Kafka/database settings: just the consumer group id this process's
/// poll service joins.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub group_id: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        dotenv::dotenv().ok();
        Ok(Self {
            runtime: RuntimeConfig::from_env()?,
            group_id: env_or("K_CONSUMER_GROUP_ID", "orders-consumer".to_string())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_defaults_when_unset() {
        std::env::remove_var("K_CONSUMER_GROUP_ID");
        let group_id: String = env_or("K_CONSUMER_GROUP_ID", "orders-consumer".to_string()).unwrap();
        assert_eq!(group_id, "orders-consumer");
    }
}

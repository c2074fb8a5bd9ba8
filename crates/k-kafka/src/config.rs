use k_core::config::{env_or, require_env};
use k_core::{ClientConfig, ConfigurationError};

/// Connection-level settings: everything needed to build an `rdkafka`
/// `ClientConfig` before any of the runtime settings in
/// [`k_core::ClientConfig`] come into play.
#[derive(Debug, Clone)]
pub struct KafkaConnectionSettings {
    pub bootstrap_servers: String,
    pub client_id: String,
    pub security_protocol: Option<String>,
}

impl KafkaConnectionSettings {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        dotenv::dotenv().ok();
        Ok(Self {
            bootstrap_servers: env_or("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092".to_string())?,
            client_id: env_or("KAFKA_CLIENT_ID", "k-kafka".to_string())?,
            security_protocol: std::env::var("KAFKA_SECURITY_PROTOCOL").ok(),
        })
    }

    pub fn to_rdkafka_config(&self) -> rdkafka::ClientConfig {
        let mut config = rdkafka::ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("client.id", &self.client_id);
        if let Some(protocol) = &self.security_protocol {
            config.set("security.protocol", protocol);
        }
        config
    }
}

/// Full runtime configuration for a `k-kafka` deployment: the connection
/// settings plus the behavioral settings from `k-core`.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub connection: KafkaConnectionSettings,
    pub client: ClientConfig,
    pub database_url: String,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        dotenv::dotenv().ok();
        let connection = KafkaConnectionSettings::from_env()?;
        let mut client = ClientConfig::default();
        client.use_single_node = env_or("K_KAFKA_SINGLE_NODE", false)?;
        client.outbox.batch_size = env_or("K_KAFKA_OUTBOX_BATCH_SIZE", client.outbox.batch_size)?;
        client.buffer.capacity = env_or("K_KAFKA_BUFFER_CAPACITY", client.buffer.capacity)?;
        client.validate()?;
        Ok(Self { connection, client, database_url: require_env("DATABASE_URL")? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_settings_default_to_localhost() {
        std::env::remove_var("KAFKA_BOOTSTRAP_SERVERS");
        std::env::remove_var("KAFKA_CLIENT_ID");
        let settings = KafkaConnectionSettings::from_env().unwrap();
        assert_eq!(settings.bootstrap_servers, "localhost:9092");
        assert_eq!(settings.client_id, "k-kafka");
    }
}

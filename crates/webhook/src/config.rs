use k_core::config::env_or;
use k_core::ConfigurationError;
use k_kafka::RuntimeConfig;

/// Webhook-specific configuration layered on top of [`RuntimeConfig`]'s
/// Kafka/database settings: just the HTTP listen address.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        dotenv::dotenv().ok();
        Ok(Self {
            runtime: RuntimeConfig::from_env()?,
            host: env_or("WEBHOOK_HOST", "0.0.0.0".to_string())?,
            port: env_or("WEBHOOK_PORT", 8000u16)?,
        })
    }

    pub fn listen_address(&self) -> std::net::SocketAddr {
        format!("{}:{}", self.host, self.port).parse().expect("invalid WEBHOOK_HOST/WEBHOOK_PORT")
    }
}

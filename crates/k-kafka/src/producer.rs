use std::time::Duration;

use rdkafka::config::ClientConfig as RdClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use crate::errors::DispatchError;

/// Thin wrapper around `rdkafka`'s `FutureProducer`, giving the outbox
/// writer and worker a single place to build headers and handle timeouts
/// consistently.
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    pub fn new(rd_config: &RdClientConfig) -> Result<Self, DispatchError> {
        let producer: FutureProducer = rd_config.create().map_err(DispatchError::Producer)?;
        Ok(Self { producer })
    }

    pub async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
        headers: &[(&str, &str)],
    ) -> Result<(i32, i64), DispatchError> {
        let mut owned_headers = OwnedHeaders::new();
        for (name, value) in headers {
            owned_headers = owned_headers.insert(Header { key: name, value: Some(*value) });
        }

        let mut record = FutureRecord::to(topic).payload(payload).headers(owned_headers);
        if let Some(key) = key {
            record = record.key(key);
        }

        self.producer
            .send(record, Timeout::After(Duration::from_secs(10)))
            .await
            .map(|(partition, offset)| (partition, offset))
            .map_err(|(err, _)| DispatchError::Producer(err))
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::headers::{HEADER_CORRELATION_ID, HEADER_MESSAGE_ID, HEADER_TYPE};

/// Position of a message within a Kafka topic, filled in once it has
/// actually been read from (or produced to) a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPartitionOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// The unit that flows through a middleware chain on both the produce and
/// consume side.
///
/// `T` is the deserialized payload on the consume side, and the value being
/// produced on the produce side. Headers and the partition key travel
/// alongside it; `raw_payload` holds the wire bytes before/after codec
/// (de)serialization so middleware can inspect them without forcing an
/// early decode.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub id: Uuid,
    pub headers: HashMap<String, String>,
    pub key: Option<String>,
    pub raw_payload: Option<Vec<u8>>,
    pub data: Option<T>,
    pub created_at: DateTime<Utc>,
    pub topic_partition_offset: Option<TopicPartitionOffset>,
    /// Set by a middleware that has fully handled this envelope. Later
    /// middlewares in the chain should treat a cleaned envelope as
    /// already-terminal and skip further side effects, but the chain still
    /// unwinds through them (so outer middlewares can still run teardown).
    cleaned: bool,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            headers: HashMap::new(),
            key: None,
            raw_payload: None,
            data: Some(data),
            created_at: Utc::now(),
            topic_partition_offset: None,
            cleaned: false,
        }
    }

    pub fn from_wire(id: Uuid, headers: HashMap<String, String>, raw_payload: Vec<u8>) -> Self {
        Self {
            id,
            headers,
            key: None,
            raw_payload: Some(raw_payload),
            data: None,
            created_at: Utc::now(),
            topic_partition_offset: None,
            cleaned: false,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn type_name(&self) -> Option<&str> {
        self.header(HEADER_TYPE)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.header(HEADER_CORRELATION_ID)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.header(HEADER_MESSAGE_ID)
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned
    }

    /// Marks the envelope as handled. Idempotent: a middleware further
    /// down the chain can call this more than once without effect.
    pub fn mark_cleaned(&mut self) {
        self.cleaned = true;
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            id: self.id,
            headers: self.headers,
            key: self.key,
            raw_payload: self.raw_payload,
            data: self.data.map(f),
            created_at: self.created_at,
            topic_partition_offset: self.topic_partition_offset,
            cleaned: self.cleaned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_envelope_starts_uncleaned_with_no_offset() {
        let env = Envelope::new(42u32);
        assert!(!env.is_cleaned());
        assert!(env.topic_partition_offset.is_none());
        assert_eq!(env.data, Some(42));
    }

    #[test]
    fn mark_cleaned_is_idempotent() {
        let mut env = Envelope::new("x");
        env.mark_cleaned();
        env.mark_cleaned();
        assert!(env.is_cleaned());
    }

    #[test]
    fn header_round_trip() {
        let mut env = Envelope::new(1);
        env.set_header(HEADER_TYPE, "Order");
        assert_eq!(env.type_name(), Some("Order"));
    }
}

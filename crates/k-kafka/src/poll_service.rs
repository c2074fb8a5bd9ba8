use std::sync::Arc;

use dashmap::DashMap;
use k_core::{BufferSettings, Envelope};
use rdkafka::config::ClientConfig as RdClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{Message, TopicPartitionList};
use tokio_util::sync::CancellationToken;

use crate::buffer::{PerTypeBuffer, WatermarkSignal};
use crate::errors::DispatchError;
use crate::subscription_registry::SubscriptionRegistry;

/// Raw, not-yet-deserialized wire envelope sitting in a per-type buffer.
pub type RawEnvelope = Envelope<()>;

/// Single-threaded poll loop reading from one or more Kafka topics and
/// fanning each message out, by its `$type` header, into the matching
/// per-type buffer. Offset commits do not happen here: they happen in
/// the consumer pipeline, after the corresponding database transaction
/// commits, per the fixed DB-then-offset ordering.
pub struct ConsumerPollService {
    consumer: Arc<StreamConsumer>,
    buffers: DashMap<String, Arc<PerTypeBuffer<RawEnvelope>>>,
    subscriptions: Arc<SubscriptionRegistry>,
    buffer_settings: BufferSettings,
    paused: DashMap<(String, i32), bool>,
}

impl ConsumerPollService {
    pub fn new(
        rd_config: &RdClientConfig,
        subscriptions: Arc<SubscriptionRegistry>,
        buffer_settings: BufferSettings,
    ) -> Result<Self, DispatchError> {
        let consumer: StreamConsumer = rd_config.create().map_err(DispatchError::Producer)?;
        Ok(Self {
            consumer: Arc::new(consumer),
            buffers: DashMap::new(),
            subscriptions,
            buffer_settings,
            paused: DashMap::new(),
        })
    }

    pub fn subscribe(&self, topics: &[&str]) -> Result<(), DispatchError> {
        self.consumer.subscribe(topics).map_err(DispatchError::Producer)
    }

    /// Returns (creating if necessary) the buffer backing a message type.
    pub fn buffer_for(&self, message_type: &str) -> Arc<PerTypeBuffer<RawEnvelope>> {
        self.buffers
            .entry(message_type.to_string())
            .or_insert_with(|| Arc::new(PerTypeBuffer::new(self.buffer_settings.clone())))
            .clone()
    }

    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("poll service shutting down");
                    return;
                }
                result = self.consumer.recv() => {
                    match result {
                        Ok(message) => {
                            // `message` borrows from the consumer and is not `Send`, so every
                            // field we need is extracted here before any `.await` point.
                            if let Some((topic, partition, envelope)) = self.decode_message(&message) {
                                self.enqueue_envelope(topic, partition, envelope).await;
                            }
                        }
                        Err(err) => tracing::error!(error = %err, "kafka poll error"),
                    }
                }
            }
        }
    }

    /// Extracts an owned envelope (plus its topic/partition) out of a
    /// borrowed Kafka message, or `None` if the message should be skipped.
    /// Kept synchronous and free of the original `message` reference so the
    /// caller can drop it before doing any `.await`ing.
    fn decode_message(
        &self,
        message: &rdkafka::message::BorrowedMessage<'_>,
    ) -> Option<(String, i32, RawEnvelope)> {
        let payload = message.payload().or_else(|| {
            tracing::warn!("received message with no payload, skipping");
            None
        })?;

        let mut headers = std::collections::HashMap::new();
        if let Some(header_list) = message.headers() {
            for i in 0..header_list.count() {
                if let Some(header) = header_list.get(i) {
                    if let Some(value) = header.value {
                        headers.insert(header.key.to_string(), String::from_utf8_lossy(value).to_string());
                    }
                }
            }
        }

        if !headers.contains_key(k_core::headers::HEADER_TYPE) {
            tracing::warn!("received message with no $type header, skipping");
            return None;
        }

        let topic = message.topic().to_string();
        let partition = message.partition();

        let mut envelope = RawEnvelope::from_wire(uuid::Uuid::now_v7(), headers, payload.to_vec());
        envelope.topic_partition_offset = Some(k_core::TopicPartitionOffset {
            topic: topic.clone(),
            partition,
            offset: message.offset(),
        });

        Some((topic, partition, envelope))
    }

    /// Enqueues a decoded envelope into its type's buffer, pausing the
    /// source partition on a high-watermark crossing and resuming it on a
    /// low-watermark crossing. Under [`k_core::BackpressurePolicy::ApplyBackpressure`]
    /// a full buffer pauses the partition and blocks until the enqueue
    /// succeeds rather than dropping the record (per the no-silent-drop
    /// guarantee).
    async fn enqueue_envelope(&self, topic: String, partition: i32, envelope: RawEnvelope) {
        let message_type = envelope
            .headers
            .get(k_core::headers::HEADER_TYPE)
            .cloned()
            .unwrap_or_default();
        let buffer = self.buffer_for(&message_type);

        match buffer.try_enqueue(envelope) {
            crate::buffer::EnqueueOutcome::Enqueued { signal: Some(WatermarkSignal::CrossedHigh) } => {
                self.pause(&topic, partition);
            }
            crate::buffer::EnqueueOutcome::Enqueued { signal: Some(WatermarkSignal::CrossedLow) } => {
                self.resume(&topic, partition);
            }
            crate::buffer::EnqueueOutcome::Enqueued { signal: None } => {}
            crate::buffer::EnqueueOutcome::Dropped => {
                tracing::warn!(message_type, "message dropped by configured buffer eviction policy");
            }
            crate::buffer::EnqueueOutcome::Full(envelope) => {
                tracing::warn!(message_type, topic, partition, "buffer full under ApplyBackpressure, pausing partition");
                self.pause(&topic, partition);
                if let Some(signal) = buffer.enqueue_blocking(envelope).await {
                    match signal {
                        WatermarkSignal::CrossedHigh => {}
                        WatermarkSignal::CrossedLow => self.resume(&topic, partition),
                    }
                }
            }
        }
    }

    fn pause(&self, topic: &str, partition: i32) {
        let key = (topic.to_string(), partition);
        if self.paused.insert(key.clone(), true).is_some() {
            return;
        }
        let mut tpl = TopicPartitionList::new();
        let _ = tpl.add_partition(topic, partition);
        if let Err(err) = self.consumer.pause(&tpl) {
            tracing::error!(error = %err, topic, partition, "failed to pause partition");
        } else {
            tracing::info!(topic, partition, "paused partition under backpressure");
        }
    }

    fn resume(&self, topic: &str, partition: i32) {
        let key = (topic.to_string(), partition);
        if self.paused.remove(&key).is_none() {
            return;
        }
        let mut tpl = TopicPartitionList::new();
        let _ = tpl.add_partition(topic, partition);
        if let Err(err) = self.consumer.resume(&tpl) {
            tracing::error!(error = %err, topic, partition, "failed to resume partition");
        } else {
            tracing::info!(topic, partition, "resumed partition");
        }
    }

    /// Returns a handle to the underlying consumer, shared with the poll
    /// loop, so a [`crate::pipeline::ConsumerPipeline`] can commit offsets
    /// on it after its own database transaction commits.
    pub fn consumer_handle(&self) -> Arc<StreamConsumer> {
        self.consumer.clone()
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use k_core::ExclusivitySettings;
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig as RdClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext, Rebalance};
use rdkafka::error::KafkaResult;
use rdkafka::topic_partition_list::TopicPartitionList;

use crate::errors::LeaseError;

/// Single-partition exclusivity lease used to ensure only one process runs
/// the outbox polling worker and the inbox cleanup sweep at a time.
///
/// Implemented as a dedicated consumer group subscribed to a single
/// coordination topic partition: whichever process is assigned that
/// partition during a rebalance holds the lease until the broker hands it
/// to someone else. No external lock service is involved.
pub struct ExclusivityLease {
    consumer: Option<BaseConsumer<LeaseContext>>,
    is_leader: Arc<AtomicBool>,
    single_node: bool,
}

struct LeaseContext {
    is_leader: Arc<AtomicBool>,
}

impl ClientContext for LeaseContext {}

impl ConsumerContext for LeaseContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        if let Rebalance::Revoke(_) = rebalance {
            tracing::info!("outbox lease revoked");
            self.is_leader.store(false, Ordering::SeqCst);
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        if let Rebalance::Assign(partitions) = rebalance {
            let holds_partition = partitions.elements().iter().any(|p| p.partition() == 0);
            if holds_partition {
                tracing::info!("outbox lease acquired");
                self.is_leader.store(true, Ordering::SeqCst);
            }
        }
    }
}

impl ExclusivityLease {
    /// Builds a lease that polls its coordination topic's single partition
    /// for leadership, joining `settings.group_id` with `settings`'s
    /// heartbeat/session timeouts. If `single_node` is set (a deployment
    /// with exactly one process, e.g. local development), the lease is
    /// bypassed entirely and this process is always considered the leader.
    pub fn new(
        rd_config: &RdClientConfig,
        settings: &ExclusivitySettings,
        single_node: bool,
    ) -> Result<Self, LeaseError> {
        let is_leader = Arc::new(AtomicBool::new(single_node));
        if single_node {
            return Ok(Self { consumer: None, is_leader, single_node });
        }

        let mut lease_config = rd_config.clone();
        lease_config
            .set("group.id", &settings.group_id)
            .set("heartbeat.interval.ms", settings.heartbeat_interval.as_millis().to_string())
            .set("session.timeout.ms", settings.session_timeout.as_millis().to_string());

        let consumer: BaseConsumer<LeaseContext> =
            lease_config.create_with_context(LeaseContext { is_leader: is_leader.clone() })?;
        consumer.subscribe(&[settings.topic_name.as_str()])?;

        Ok(Self { consumer: Some(consumer), is_leader, single_node })
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Drives rebalance callbacks. Must be polled periodically (the outbox
    /// worker calls this once per tick) for leadership changes to be
    /// observed; a no-op when `single_node` is set.
    pub fn poll(&self, timeout: Duration) {
        if self.single_node {
            return;
        }
        if let Some(consumer) = &self.consumer {
            let _ = consumer.poll(timeout);
        }
    }

    pub fn assignment(&self) -> KafkaResult<TopicPartitionList> {
        match &self.consumer {
            Some(consumer) => consumer.assignment(),
            None => Ok(TopicPartitionList::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_node_lease_is_always_leader() {
        let rd_config = RdClientConfig::new();
        let lease = ExclusivityLease::new(&rd_config, &ExclusivitySettings::default(), true).unwrap();
        assert!(lease.is_leader());
        lease.poll(Duration::from_millis(1));
        assert!(lease.is_leader());
    }
}

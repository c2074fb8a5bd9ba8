use std::any::TypeId;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

/// Tracks how many active subscribers exist per message type, so the poll
/// service knows which topics still need to be subscribed to and which can
/// be released once their last subscriber deactivates.
#[derive(Default)]
pub struct SubscriptionRegistry {
    counts: DashMap<TypeId, AtomicUsize>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `T`. Returns `true` if this was the first
    /// active subscriber for `T` (the poll service should start consuming
    /// its topic).
    pub fn activate<T: 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        match self.counts.get(&id) {
            Some(counter) => {
                counter.fetch_add(1, Ordering::SeqCst);
                false
            }
            None => {
                self.counts.insert(id, AtomicUsize::new(1));
                true
            }
        }
    }

    /// Deregisters interest in `T`. Returns `true` if this was the last
    /// active subscriber (the poll service should stop consuming its
    /// topic). Idempotent past zero: deactivating with no subscribers left
    /// is a no-op that returns `false`.
    pub fn deactivate<T: 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        let Some(counter) = self.counts.get(&id) else {
            return false;
        };
        let previous = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            if n == 0 {
                None
            } else {
                Some(n - 1)
            }
        });
        matches!(previous, Ok(1))
    }

    pub fn subscriber_count<T: 'static>(&self) -> usize {
        self.counts.get(&TypeId::of::<T>()).map(|c| c.load(Ordering::SeqCst)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Order;
    struct Invoice;

    #[test]
    fn first_activation_returns_true_subsequent_do_not() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.activate::<Order>());
        assert!(!registry.activate::<Order>());
        assert_eq!(registry.subscriber_count::<Order>(), 2);
    }

    #[test]
    fn last_deactivation_returns_true() {
        let registry = SubscriptionRegistry::new();
        registry.activate::<Order>();
        registry.activate::<Order>();
        assert!(!registry.deactivate::<Order>());
        assert!(registry.deactivate::<Order>());
        assert_eq!(registry.subscriber_count::<Order>(), 0);
    }

    #[test]
    fn types_are_tracked_independently() {
        let registry = SubscriptionRegistry::new();
        registry.activate::<Order>();
        assert_eq!(registry.subscriber_count::<Invoice>(), 0);
    }
}

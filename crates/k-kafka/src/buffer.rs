use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use k_core::{BackpressurePolicy, BufferSettings};
use tokio::sync::mpsc;

/// Edge-triggered signal emitted when a buffer's depth crosses a
/// watermark. The poll service only acts on these transitions (not on
/// every poll), so pausing/resuming a partition happens exactly once per
/// crossing rather than being re-issued on every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkSignal {
    /// Depth rose to or above the high watermark; stop polling this type.
    CrossedHigh,
    /// Depth fell to or below the low watermark; resume polling.
    CrossedLow,
}

pub enum EnqueueOutcome<T> {
    Enqueued { signal: Option<WatermarkSignal> },
    /// `DropOldest`/`DropNewest` discarded a message to make room.
    Dropped,
    /// `ApplyBackpressure` and the buffer is full: nothing was enqueued or
    /// discarded. `item` is handed back so the caller can pause the
    /// source partition and retry via [`PerTypeBuffer::enqueue_blocking`]
    /// instead of losing the message.
    Full(T),
}

/// Bounded, per-message-type FIFO buffer sitting between the Kafka poll
/// loop and a subscriber's consumer pipeline.
pub struct PerTypeBuffer<T> {
    sender: mpsc::Sender<T>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<T>>,
    depth: Arc<AtomicUsize>,
    settings: BufferSettings,
    last_signal: std::sync::Mutex<Option<WatermarkSignal>>,
}

impl<T: Send + 'static> PerTypeBuffer<T> {
    pub fn new(settings: BufferSettings) -> Self {
        let (sender, receiver) = mpsc::channel(settings.capacity);
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            depth: Arc::new(AtomicUsize::new(0)),
            settings,
            last_signal: std::sync::Mutex::new(None),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Attempts to enqueue `item` according to the configured backpressure
    /// policy. Under [`BackpressurePolicy::ApplyBackpressure`] a full buffer
    /// never drops the message: it is handed back via
    /// [`EnqueueOutcome::Full`] so the caller can pause the source
    /// partition and retry with [`PerTypeBuffer::enqueue_blocking`] instead
    /// of losing it.
    pub fn try_enqueue(&self, item: T) -> EnqueueOutcome<T> {
        match self.sender.try_send(item) {
            Ok(()) => {
                let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
                EnqueueOutcome::Enqueued { signal: self.signal_for_depth(depth) }
            }
            Err(mpsc::error::TrySendError::Full(item)) => match self.settings.policy {
                BackpressurePolicy::ApplyBackpressure => EnqueueOutcome::Full(item),
                BackpressurePolicy::DropNewest => {
                    drop(item);
                    EnqueueOutcome::Dropped
                }
                BackpressurePolicy::DropOldest => {
                    // Best-effort: drain one slot, then retry the send.
                    if let Ok(mut rx) = self.receiver.try_lock() {
                        let _ = rx.try_recv();
                        self.depth.fetch_sub(1, Ordering::SeqCst);
                    }
                    match self.sender.try_send(item) {
                        Ok(()) => {
                            let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
                            EnqueueOutcome::Enqueued { signal: self.signal_for_depth(depth) }
                        }
                        Err(_) => EnqueueOutcome::Dropped,
                    }
                }
            },
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueOutcome::Dropped,
        }
    }

    /// Enqueues `item`, waiting for room if the buffer is currently full.
    /// Used by the poll loop to satisfy `ApplyBackpressure` once it has
    /// paused the source partition: the send completes as soon as a
    /// consumer pipeline drains the buffer below capacity, at which point
    /// the caller resumes polling.
    pub async fn enqueue_blocking(&self, item: T) -> Option<WatermarkSignal> {
        // `send` returns Err only if every receiver has been dropped, which
        // would mean the pipeline consuming this buffer has shut down.
        if self.sender.send(item).await.is_err() {
            return None;
        }
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        self.signal_for_depth(depth)
    }

    pub async fn dequeue(&self) -> Option<(T, Option<WatermarkSignal>)> {
        let item = {
            let mut rx = self.receiver.lock().await;
            rx.recv().await
        }?;
        let depth = self.depth.fetch_sub(1, Ordering::SeqCst) - 1;
        Some((item, self.signal_for_depth(depth)))
    }

    fn signal_for_depth(&self, depth: usize) -> Option<WatermarkSignal> {
        let mut last = self.last_signal.lock().unwrap();
        let signal = if depth >= self.settings.high_watermark && *last != Some(WatermarkSignal::CrossedHigh) {
            Some(WatermarkSignal::CrossedHigh)
        } else if depth <= self.settings.low_watermark && *last != Some(WatermarkSignal::CrossedLow) {
            Some(WatermarkSignal::CrossedLow)
        } else {
            None
        };
        if let Some(s) = signal {
            *last = Some(s);
        }
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BufferSettings {
        BufferSettings { capacity: 10, high_watermark: 8, low_watermark: 2, ..Default::default() }
    }

    #[test]
    fn enqueue_signals_high_watermark_crossing_once() {
        let buffer = PerTypeBuffer::<u32>::new(settings());
        let mut saw_high = 0;
        for i in 0..10 {
            if let EnqueueOutcome::Enqueued { signal: Some(WatermarkSignal::CrossedHigh) } = buffer.try_enqueue(i) {
                saw_high += 1;
            }
        }
        assert_eq!(saw_high, 1, "high watermark should only fire once per crossing");
        assert_eq!(buffer.depth(), 10);
    }

    #[tokio::test]
    async fn dequeue_signals_low_watermark_crossing_once() {
        let buffer = PerTypeBuffer::<u32>::new(settings());
        for i in 0..10 {
            buffer.try_enqueue(i);
        }
        let mut saw_low = 0;
        for _ in 0..10 {
            if let Some((_, Some(WatermarkSignal::CrossedLow))) = buffer.dequeue().await {
                saw_low += 1;
            }
        }
        assert_eq!(saw_low, 1);
        assert_eq!(buffer.depth(), 0);
    }

    #[test]
    fn drop_newest_policy_discards_overflow() {
        let settings = BufferSettings { policy: BackpressurePolicy::DropNewest, ..settings() };
        let buffer = PerTypeBuffer::<u32>::new(settings);
        for i in 0..10 {
            buffer.try_enqueue(i);
        }
        let outcome = buffer.try_enqueue(99);
        assert!(matches!(outcome, EnqueueOutcome::Dropped));
        assert_eq!(buffer.depth(), 10);
    }

    #[test]
    fn apply_backpressure_policy_never_drops_on_full_buffer() {
        let settings = BufferSettings { policy: BackpressurePolicy::ApplyBackpressure, ..settings() };
        let buffer = PerTypeBuffer::<u32>::new(settings);
        for i in 0..10 {
            buffer.try_enqueue(i);
        }
        match buffer.try_enqueue(99) {
            EnqueueOutcome::Full(item) => assert_eq!(item, 99),
            EnqueueOutcome::Dropped => panic!("ApplyBackpressure must never drop"),
            EnqueueOutcome::Enqueued { .. } => panic!("buffer was supposed to be full"),
        }
        assert_eq!(buffer.depth(), 10, "the rejected item must not count against depth");
    }

    #[tokio::test]
    async fn enqueue_blocking_completes_once_room_is_freed() {
        let buffer = Arc::new(PerTypeBuffer::<u32>::new(settings()));
        for i in 0..10 {
            buffer.try_enqueue(i);
        }
        assert!(matches!(buffer.try_enqueue(99), EnqueueOutcome::Full(99)));

        let waiter = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.enqueue_blocking(99).await })
        };
        // Free one slot; enqueue_blocking should then complete.
        buffer.dequeue().await;
        waiter.await.unwrap();
        assert_eq!(buffer.depth(), 10);
    }
}

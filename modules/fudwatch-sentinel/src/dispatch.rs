//! Fan-out from the single detector stream to downstream pipelines.
//!
//! Delivery is non-blocking by policy: a saturated queue drops the event
//! (counted and logged) rather than stalling the change detector or a
//! sibling pipeline. Freshness of the feed beats completeness of delivery
//! to any single slow consumer.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::warn;

use fudwatch_common::MessageEvent;

struct Outlet {
    name: &'static str,
    tx: mpsc::Sender<MessageEvent>,
    dropped: AtomicU64,
}

/// Delivers a copy of each inbound event to every registered bounded queue.
pub struct Dispatcher {
    outlets: Vec<Outlet>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            outlets: Vec::new(),
        }
    }

    /// Register a downstream pipeline; returns the receiving end of its
    /// bounded queue.
    pub fn register(
        &mut self,
        name: &'static str,
        capacity: usize,
    ) -> mpsc::Receiver<MessageEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.outlets.push(Outlet {
            name,
            tx,
            dropped: AtomicU64::new(0),
        });
        rx
    }

    /// Offer an event to every outlet. Returns how many accepted it.
    pub fn offer_all(&self, event: &MessageEvent) -> usize {
        self.outlets
            .iter()
            .filter(|outlet| Self::offer(outlet, event))
            .count()
    }

    /// Non-blocking offer to one outlet. True iff the event was enqueued.
    fn offer(outlet: &Outlet, event: &MessageEvent) -> bool {
        match outlet.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                outlet.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    outlet = outlet.name,
                    message_id = event.message.id.as_str(),
                    "Queue full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                outlet.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    outlet = outlet.name,
                    message_id = event.message.id.as_str(),
                    "Consumer gone, dropping event"
                );
                false
            }
        }
    }

    /// Total events dropped by the named outlet.
    pub fn dropped(&self, name: &str) -> u64 {
        self.outlets
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Total events dropped across all outlets.
    pub fn dropped_total(&self) -> u64 {
        self.outlets
            .iter()
            .map(|o| o.dropped.load(Ordering::Relaxed))
            .sum()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_event;

    #[test]
    fn full_queue_drops_without_blocking_and_siblings_still_receive() {
        let mut dispatcher = Dispatcher::new();
        let mut slow_rx = dispatcher.register("slow", 1);
        let mut fast_rx = dispatcher.register("fast", 8);

        let first = make_event("m1", "alice");
        let second = make_event("m2", "bob");

        assert_eq!(dispatcher.offer_all(&first), 2);
        // "slow" is now saturated: the second offer must return immediately,
        // drop for "slow", and still land on "fast".
        assert_eq!(dispatcher.offer_all(&second), 1);

        assert_eq!(dispatcher.dropped("slow"), 1);
        assert_eq!(dispatcher.dropped("fast"), 0);

        assert_eq!(slow_rx.try_recv().unwrap().message.id, "m1");
        assert!(slow_rx.try_recv().is_err(), "dropped event must not arrive");
        assert_eq!(fast_rx.try_recv().unwrap().message.id, "m1");
        assert_eq!(fast_rx.try_recv().unwrap().message.id, "m2");
    }

    #[test]
    fn closed_consumer_counts_as_drop() {
        let mut dispatcher = Dispatcher::new();
        let rx = dispatcher.register("gone", 4);
        drop(rx);

        assert_eq!(dispatcher.offer_all(&make_event("m1", "alice")), 0);
        assert_eq!(dispatcher.dropped("gone"), 1);
        assert_eq!(dispatcher.dropped_total(), 1);
    }
}

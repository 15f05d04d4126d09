use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

/// Events published to subscribers. Kinds only, no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreEvent {
    /// The item set changed; re-read whatever you display.
    DataChanged,
    /// A write was dropped by the write-rate guard.
    WriteThrottled,
    /// The store was upgraded by another session; the host must start over.
    ResetRequired,
}

/// Fan-out of [`StoreEvent`]s to bounded per-subscriber channels.
///
/// Publishing never blocks: a full subscriber loses the event (counted in
/// [`EventBus::dropped_events`]); a dropped subscriber is pruned.
#[derive(Debug)]
pub struct EventBus {
    capacity: usize,
    subscribers: Mutex<Vec<Sender<StoreEvent>>>,
    dropped_events: AtomicU64,
}

impl EventBus {
    /// Creates a bus whose subscribers buffer up to `capacity` events each.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = bounded(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Subscription { rx }
    }

    /// Delivers `event` to every live subscriber.
    pub fn publish(&self, event: StoreEvent) {
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subs.retain(|tx| match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Live subscribers as of the last publish.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Disconnects every subscriber.
    pub fn close(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Receiving end of an [`EventBus`] subscription.
///
/// Dropping it unsubscribes; the bus prunes the sender on its next publish.
#[derive(Debug)]
pub struct Subscription {
    rx: Receiver<StoreEvent>,
}

impl Subscription {
    /// Next event if one is queued.
    #[must_use]
    pub fn try_recv(&self) -> Option<StoreEvent> {
        self.rx.try_recv().ok()
    }

    /// Waits up to `timeout`. `None` on timeout or once the bus is closed.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<StoreEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Everything currently queued, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<StoreEvent> {
        self.rx.try_iter().collect()
    }
}

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::{bounded, select, Sender};

use crate::clock::Clock;

use super::events::{EventBus, StoreEvent};

/// Coalesces bursts of mutations into one [`StoreEvent::DataChanged`].
///
/// Every `touch` re-arms the deadline; `poll` publishes once the deadline has
/// passed without a newer touch. Time comes from the injected clock, so tests
/// can drive the window without sleeping.
pub struct ChangeNotifier {
    clock: Arc<dyn Clock>,
    debounce: Duration,
    deadline: Mutex<Option<DateTime<Utc>>>,
    bus: Arc<EventBus>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("debounce", &self.debounce)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

impl ChangeNotifier {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, debounce_ms: u64, bus: Arc<EventBus>) -> Self {
        Self {
            clock,
            debounce: Duration::milliseconds(i64::try_from(debounce_ms).unwrap_or(i64::MAX)),
            deadline: Mutex::new(None),
            bus,
        }
    }

    /// Records a mutation and pushes the deadline out.
    pub fn touch(&self) {
        let deadline = self.clock.now() + self.debounce;
        *self.lock() = Some(deadline);
    }

    /// Publishes `DataChanged` if the window has elapsed. Returns true if it did.
    pub fn poll(&self) -> bool {
        let now = self.clock.now();
        let fire = {
            let mut deadline = self.lock();
            match *deadline {
                Some(at) if at <= now => {
                    *deadline = None;
                    true
                }
                _ => false,
            }
        };
        if fire {
            self.bus.publish(StoreEvent::DataChanged);
        }
        fire
    }

    /// Publishes immediately if a change is pending, ignoring the window.
    pub fn flush(&self) -> bool {
        let fire = self.lock().take().is_some();
        if fire {
            self.bus.publish(StoreEvent::DataChanged);
        }
        fire
    }

    /// Drops a pending change without publishing.
    pub fn cancel(&self) {
        *self.lock() = None;
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the thread that polls every `tick` until the handle is dropped.
    ///
    /// The thread holds only a weak reference and exits on its own once the
    /// notifier is gone.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn_pump(self: &Arc<Self>, tick: std::time::Duration) -> std::io::Result<PumpHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let notifier: Weak<Self> = Arc::downgrade(self);

        let join = thread::Builder::new()
            .name("lexiq-notify".to_string())
            .spawn(move || loop {
                let stop = select! {
                    recv(stop_rx) -> _ => true,
                    default(tick) => match notifier.upgrade() {
                        Some(n) => {
                            n.poll();
                            false
                        }
                        None => true,
                    },
                };
                if stop {
                    break;
                }
            })?;

        Ok(PumpHandle {
            stop_tx: Some(stop_tx),
            join: Some(join),
        })
    }
}

/// Owns the pump thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct PumpHandle {
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        // Disconnecting the stop channel wakes the select.
        drop(self.stop_tx.take());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn notifier(debounce_ms: u64) -> (Arc<ManualClock>, Arc<EventBus>, ChangeNotifier) {
        let clock = Arc::new(ManualClock::epoch());
        let bus = Arc::new(EventBus::new(16));
        let n = ChangeNotifier::new(clock.clone(), debounce_ms, Arc::clone(&bus));
        (clock, bus, n)
    }

    #[test]
    fn test_burst_yields_single_event() {
        let (clock, bus, n) = notifier(250);
        let sub = bus.subscribe();

        for _ in 0..10 {
            n.touch();
            clock.advance(Duration::milliseconds(5));
            assert!(!n.poll());
        }
        clock.advance(Duration::milliseconds(250));
        assert!(n.poll());
        assert!(!n.poll());

        assert_eq!(sub.drain(), vec![StoreEvent::DataChanged]);
    }

    #[test]
    fn test_touch_rearms_deadline() {
        let (clock, _bus, n) = notifier(100);
        n.touch();
        clock.advance(Duration::milliseconds(90));
        n.touch();
        clock.advance(Duration::milliseconds(90));
        assert!(!n.poll());
        clock.advance(Duration::milliseconds(10));
        assert!(n.poll());
    }

    #[test]
    fn test_flush_and_cancel() {
        let (_clock, bus, n) = notifier(1000);
        let sub = bus.subscribe();

        n.touch();
        n.cancel();
        assert!(!n.flush());

        n.touch();
        assert!(n.flush());
        assert_eq!(sub.drain().len(), 1);
    }

    #[test]
    fn test_pump_publishes_with_system_clock() {
        let bus = Arc::new(EventBus::new(4));
        let sub = bus.subscribe();
        let n = Arc::new(ChangeNotifier::new(
            Arc::new(crate::clock::SystemClock),
            10,
            Arc::clone(&bus),
        ));
        let pump = n.spawn_pump(std::time::Duration::from_millis(5)).unwrap();

        n.touch();
        let got = sub.recv_timeout(std::time::Duration::from_secs(2));
        drop(pump);

        assert_eq!(got, Some(StoreEvent::DataChanged));
    }
}

//! Write-rate guard.
//!
//! Protects the store from runaway write bursts. The cooldown window is
//! measured from the last *accepted* write; rejected attempts never extend it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;

/// Accepts at most one write per cooldown window.
pub struct WriteGuard {
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    last_accepted: Mutex<Option<DateTime<Utc>>>,
    throttled: AtomicU64,
}

impl std::fmt::Debug for WriteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteGuard")
            .field("cooldown", &self.cooldown)
            .field("throttled", &self.throttled())
            .finish_non_exhaustive()
    }
}

impl WriteGuard {
    /// Creates a guard with the given cooldown in milliseconds.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, cooldown_ms: u64) -> Self {
        Self {
            clock,
            cooldown: Duration::milliseconds(i64::try_from(cooldown_ms).unwrap_or(i64::MAX)),
            last_accepted: Mutex::new(None),
            throttled: AtomicU64::new(0),
        }
    }

    /// Returns true and starts a new window if no write was accepted within
    /// the cooldown; otherwise counts the rejection and returns false.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut last = self.last_accepted.lock().unwrap_or_else(PoisonError::into_inner);

        let open = match *last {
            None => true,
            Some(prev) => now - prev >= self.cooldown,
        };
        if open {
            *last = Some(now);
        } else {
            self.throttled.fetch_add(1, Ordering::Relaxed);
        }
        open
    }

    /// Forgets the last accepted write.
    pub fn reset(&self) {
        *self.last_accepted.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Rejected attempts so far.
    #[must_use]
    pub fn throttled(&self) -> u64 {
        self.throttled.load(Ordering::Relaxed)
    }
}

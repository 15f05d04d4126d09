//! Time source abstraction.
//!
//! Every time-dependent component (write guard, debounce, due classification,
//! today's counters) reads the current instant through a [`Clock`] so tests can
//! drive a virtual clock instead of sleeping.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually advanced clock for deterministic tests.
///
/// # Examples
///
/// ```
/// use chrono::Duration;
/// use lexiq::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::epoch();
/// let before = clock.now();
/// clock.advance(Duration::milliseconds(500));
/// assert_eq!(clock.now() - before, Duration::milliseconds(500));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Creates a clock frozen at a fixed, arbitrary instant (2024-01-01T12:00:00Z).
    #[must_use]
    pub fn epoch() -> Self {
        let start = DateTime::from_timestamp(1_704_110_400, 0).unwrap_or_default();
        Self::new(start)
    }

    /// Moves the clock forward (or backward for negative durations).
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += by;
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

//! Wall-clock abstraction shared by the countdown and the reaction expiry sweep.

use std::sync::{Mutex, PoisonError};

use time::{Duration, OffsetDateTime};

/// Source of "now" for every time-dependent component.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> OffsetDateTime;
}

/// Clock backed by the operating system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to, used to script countdowns and expiries.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, at: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    /// Move the clock forward (or backward with a negative duration).
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new(datetime!(2025-03-01 20:00 UTC));
        assert_eq!(clock.now(), datetime!(2025-03-01 20:00 UTC));

        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), datetime!(2025-03-01 20:01:30 UTC));

        clock.set(datetime!(2025-03-02 00:00 UTC));
        assert_eq!(clock.now(), datetime!(2025-03-02 00:00 UTC));
    }
}

//! Injected wall-clock.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;

use relaunch_types::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Reads the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = Utc::now().timestamp_millis();
        Timestamp::from_epoch_secs(millis as f64 / 1000.0).unwrap_or(Timestamp::UNIX_EPOCH)
    }
}

/// A clock that only moves when told to.
///
/// Lets time-window and expiry logic be exercised without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Convenience for tests: start at `secs` seconds past the epoch.
    ///
    /// Non-finite input starts at the epoch.
    #[must_use]
    pub fn at_secs(secs: f64) -> Self {
        Self::new(Timestamp::from_epoch_secs(secs).unwrap_or(Timestamp::UNIX_EPOCH))
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn set_secs(&self, secs: f64) {
        if let Some(now) = Timestamp::from_epoch_secs(secs) {
            self.set(now);
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.plus(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::at_secs(100.0);
        assert_eq!(clock.now().as_epoch_secs(), 100.0);
        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.now().as_epoch_secs(), 160.0);
        clock.set_secs(10.0);
        assert_eq!(clock.now().as_epoch_secs(), 10.0);
        clock.set_secs(f64::NAN);
        assert_eq!(clock.now().as_epoch_secs(), 10.0);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now().as_epoch_secs() > 1_577_836_800.0);
    }
}

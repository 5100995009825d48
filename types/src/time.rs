//! Epoch timestamps as persisted by the launch state store.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Seconds since the Unix epoch.
///
/// Invariant: the inner value is always finite. Values read back from storage
/// go through [`Timestamp::from_epoch_secs`], which rejects NaN and infinities.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    pub const UNIX_EPOCH: Self = Self(0.0);

    /// Returns `None` for non-finite input.
    #[must_use]
    pub fn from_epoch_secs(secs: f64) -> Option<Self> {
        secs.is_finite().then_some(Self(secs))
    }

    #[must_use]
    pub const fn as_epoch_secs(self) -> f64 {
        self.0
    }

    /// Signed seconds elapsed from `earlier` to `self`.
    ///
    /// Negative when `earlier` lies in the future relative to `self`.
    #[must_use]
    pub fn secs_since(self, earlier: Self) -> f64 {
        self.0 - earlier.0
    }

    #[must_use]
    pub fn minus(self, duration: Duration) -> Self {
        Self(self.0 - duration.as_secs_f64())
    }

    #[must_use]
    pub fn plus(self, duration: Duration) -> Self {
        Self(self.0 + duration.as_secs_f64())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Timestamp;

    #[test]
    fn rejects_non_finite_values() {
        assert!(Timestamp::from_epoch_secs(f64::NAN).is_none());
        assert!(Timestamp::from_epoch_secs(f64::INFINITY).is_none());
        assert!(Timestamp::from_epoch_secs(f64::NEG_INFINITY).is_none());
        assert!(Timestamp::from_epoch_secs(1_700_000_000.5).is_some());
    }

    #[test]
    fn secs_since_is_signed() {
        let a = Timestamp::from_epoch_secs(100.0).unwrap();
        let b = Timestamp::from_epoch_secs(160.0).unwrap();
        assert!((b.secs_since(a) - 60.0).abs() < f64::EPSILON);
        assert!((a.secs_since(b) + 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn duration_arithmetic() {
        let t = Timestamp::from_epoch_secs(1000.0).unwrap();
        let window = Duration::from_secs(300);
        assert_eq!(t.minus(window).as_epoch_secs(), 700.0);
        assert_eq!(t.plus(window).as_epoch_secs(), 1300.0);
    }

    #[test]
    fn serializes_as_bare_number() {
        let t = Timestamp::from_epoch_secs(42.5).unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "42.5");
    }
}

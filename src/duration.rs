//! Signed duration type used throughout the clock and scheduling subsystems.
//!
//! `std::time::Duration` is unsigned, which doesn't fit a system that needs
//! to represent "elapsed since" deltas that can go negative (e.g. schedule
//! jitter, clock skew checks). All arithmetic here saturates rather than
//! panicking or wrapping.

use std::{
    cmp::Ordering,
    ops::{
        Add,
        Neg,
        Sub,
    },
    time::Duration as StdDuration,
};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A signed duration, stored as whole seconds plus a sub-second nanosecond
/// remainder. `nanos` is always in `[0, NANOS_PER_SEC)`; the sign lives
/// entirely on `secs`, matching the convention used by `time::Duration` in
/// other signed-duration crates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Duration {
    secs: i64,
    nanos: u32,
}

impl Duration {
    pub const ZERO: Duration = Duration { secs: 0, nanos: 0 };
    pub const MAX: Duration = Duration {
        secs: i64::MAX,
        nanos: (NANOS_PER_SEC - 1) as u32,
    };
    pub const MIN: Duration = Duration {
        secs: i64::MIN,
        nanos: 0,
    };

    fn normalize(mut secs: i64, mut nanos: i64) -> Duration {
        if nanos >= NANOS_PER_SEC {
            let carry = nanos / NANOS_PER_SEC;
            secs = secs.saturating_add(carry);
            nanos -= carry * NANOS_PER_SEC;
        } else if nanos < 0 {
            let borrow = (-nanos + NANOS_PER_SEC - 1) / NANOS_PER_SEC;
            secs = secs.saturating_sub(borrow);
            nanos += borrow * NANOS_PER_SEC;
        }
        Duration {
            secs,
            nanos: nanos as u32,
        }
    }

    pub fn from_secs(secs: i64) -> Duration {
        Duration { secs, nanos: 0 }
    }

    pub fn from_millis(millis: i64) -> Duration {
        let secs = millis.div_euclid(1_000);
        let rem_ms = millis.rem_euclid(1_000);
        Duration::normalize(secs, rem_ms * 1_000_000)
    }

    pub fn from_micros(micros: i64) -> Duration {
        let secs = micros.div_euclid(1_000_000);
        let rem_us = micros.rem_euclid(1_000_000);
        Duration::normalize(secs, rem_us * 1_000)
    }

    pub fn from_nanos(nanos: i64) -> Duration {
        let secs = nanos.div_euclid(NANOS_PER_SEC);
        let rem = nanos.rem_euclid(NANOS_PER_SEC);
        Duration::normalize(secs, rem)
    }

    pub fn from_minutes(minutes: i64) -> Duration {
        Duration::from_secs(minutes.saturating_mul(60))
    }

    pub fn from_hours(hours: i64) -> Duration {
        Duration::from_secs(hours.saturating_mul(3_600))
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + self.nanos as f64 / NANOS_PER_SEC as f64
    }

    pub fn as_millis_i64(&self) -> i64 {
        self.secs.saturating_mul(1_000) + (self.nanos as i64) / 1_000_000
    }

    pub fn is_negative(&self) -> bool {
        self.secs < 0
    }

    pub fn is_zero(&self) -> bool {
        self.secs == 0 && self.nanos == 0
    }

    /// Saturating addition; never panics or wraps.
    pub fn plus(&self, other: Duration) -> Duration {
        let secs = self.secs.saturating_add(other.secs);
        Duration::normalize(secs, self.nanos as i64 + other.nanos as i64)
    }

    /// Scale by a real-valued factor, saturating at the representable bounds.
    pub fn times(&self, factor: f64) -> Duration {
        let scaled = self.as_secs_f64() * factor;
        if scaled.is_nan() {
            return Duration::ZERO;
        }
        if scaled >= i64::MAX as f64 {
            return Duration::MAX;
        }
        if scaled <= i64::MIN as f64 {
            return Duration::MIN;
        }
        Duration::from_nanos((scaled * NANOS_PER_SEC as f64) as i64)
    }

    /// Convert to the non-negative `std::time::Duration`, clamping any
    /// negative value to zero. Used at boundaries with clocks and timers,
    /// which only ever sleep for a non-negative amount of time.
    pub fn to_std_saturating(&self) -> StdDuration {
        if self.is_negative() {
            StdDuration::ZERO
        } else {
            StdDuration::new(self.secs as u64, self.nanos)
        }
    }

    pub fn from_std(d: StdDuration) -> Duration {
        Duration {
            secs: d.as_secs() as i64,
            nanos: d.subsec_nanos(),
        }
    }
}

impl Default for Duration {
    fn default() -> Self {
        Duration::ZERO
    }
}

impl Ord for Duration {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.secs, self.nanos).cmp(&(other.secs, other.nanos))
    }
}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        self.plus(rhs)
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        self.plus(rhs.neg())
    }
}

impl Neg for Duration {
    type Output = Duration;

    fn neg(self) -> Duration {
        if self.is_zero() {
            return self;
        }
        // secs carries the sign; nanos is always >= 0, so negating means
        // borrowing one second to keep the nanos remainder non-negative.
        Duration::normalize(-self.secs - 1, (NANOS_PER_SEC - self.nanos as i64) % NANOS_PER_SEC)
    }
}

#[cfg(test)]
mod tests {
    use super::Duration;

    #[test]
    fn construction_round_trips() {
        assert_eq!(Duration::from_millis(1_500).as_millis_i64(), 1_500);
        assert_eq!(Duration::from_secs(2).as_millis_i64(), 2_000);
        assert_eq!(Duration::from_minutes(1).as_millis_i64(), 60_000);
        assert_eq!(Duration::from_hours(1).as_millis_i64(), 3_600_000);
    }

    #[test]
    fn negative_durations_normalize() {
        let d = Duration::from_millis(-1_500);
        assert!(d.is_negative());
        assert_eq!(d.as_millis_i64(), -1_500);
    }

    #[test]
    fn plus_and_times() {
        let a = Duration::from_secs(1);
        let b = Duration::from_millis(500);
        assert_eq!(a.plus(b).as_millis_i64(), 1_500);
        assert_eq!(a.times(2.5).as_millis_i64(), 2_500);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let huge = Duration::from_secs(i64::MAX);
        assert_eq!(huge.plus(Duration::from_secs(1)), Duration::MAX);
    }

    #[test]
    fn negation_round_trips() {
        let d = Duration::from_millis(1_234);
        assert_eq!((-d).as_millis_i64(), -1_234);
        assert_eq!(-(-d), d);
    }

    #[test]
    fn to_std_saturating_clamps_negative() {
        let d = Duration::from_millis(-10);
        assert_eq!(d.to_std_saturating(), std::time::Duration::ZERO);
    }
}

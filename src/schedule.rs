//! Data-driven retry/repeat policies. See §3.6.
//!
//! A `Schedule` is a small tree of constructors; `Schedule::step` is the
//! single place that interprets it, given the 0-based attempt number and the
//! elapsed wall time since the first attempt.

use rand::Rng;

use crate::duration::Duration;

#[derive(Clone, Debug)]
pub enum Schedule {
    Once,
    Fixed(Duration),
    Exponential { base: Duration, factor: f64 },
    Fibonacci(Duration),
    Linear(Duration),
    Bounded { inner: Box<Schedule>, max_attempts: u32 },
    UpTo { inner: Box<Schedule>, max_wall: Duration },
    Jittered { inner: Box<Schedule>, factor: f64 },
}

/// The outcome of evaluating a schedule for a given attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    Stop,
    Continue(Duration),
}

impl Schedule {
    pub fn once() -> Self {
        Schedule::Once
    }

    pub fn fixed(delay: Duration) -> Self {
        Schedule::Fixed(delay)
    }

    pub fn exponential(base: Duration, factor: f64) -> Self {
        Schedule::Exponential { base, factor }
    }

    pub fn fibonacci(base: Duration) -> Self {
        Schedule::Fibonacci(base)
    }

    pub fn linear(base: Duration) -> Self {
        Schedule::Linear(base)
    }

    pub fn bounded(self, max_attempts: u32) -> Self {
        Schedule::Bounded {
            inner: Box::new(self),
            max_attempts,
        }
    }

    pub fn up_to(self, max_wall: Duration) -> Self {
        Schedule::UpTo {
            inner: Box::new(self),
            max_wall,
        }
    }

    pub fn jittered(self, factor: f64) -> Self {
        assert!((0.0..=1.0).contains(&factor), "jitter factor must be in [0, 1]");
        Schedule::Jittered {
            inner: Box::new(self),
            factor,
        }
    }

    /// Evaluate the schedule for the given 0-based `attempt` and `elapsed`
    /// wall time since the first attempt. Bounds are checked before any
    /// delay is computed, per §3.6.
    pub fn step(&self, attempt: u32, elapsed: Duration, rng: &mut impl Rng) -> Decision {
        match self {
            Schedule::Once => {
                if attempt == 0 {
                    Decision::Continue(Duration::ZERO)
                } else {
                    Decision::Stop
                }
            },
            Schedule::Fixed(d) => Decision::Continue(*d),
            Schedule::Exponential { base, factor } => {
                Decision::Continue(base.times(factor.powi(attempt as i32)))
            },
            Schedule::Fibonacci(base) => Decision::Continue(base.times(fibonacci(attempt) as f64)),
            Schedule::Linear(base) => Decision::Continue(base.times((attempt + 1) as f64)),
            Schedule::Bounded { inner, max_attempts } => {
                if attempt >= *max_attempts {
                    Decision::Stop
                } else {
                    inner.step(attempt, elapsed, rng)
                }
            },
            Schedule::UpTo { inner, max_wall } => {
                if elapsed >= *max_wall {
                    Decision::Stop
                } else {
                    inner.step(attempt, elapsed, rng)
                }
            },
            Schedule::Jittered { inner, factor } => match inner.step(attempt, elapsed, rng) {
                Decision::Stop => Decision::Stop,
                Decision::Continue(d) => {
                    let jitter = rng.random_range((1.0 - factor)..=(1.0 + factor));
                    Decision::Continue(d.times(jitter))
                },
            },
        }
    }
}

fn fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (1u64, 1u64);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

#[cfg(test)]
mod tests {
    use rand::{
        rngs::StdRng,
        SeedableRng,
    };

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    #[test]
    fn once_stops_after_first_attempt() {
        let s = Schedule::once();
        assert_eq!(s.step(0, Duration::ZERO, &mut rng()), Decision::Continue(Duration::ZERO));
        assert_eq!(s.step(1, Duration::ZERO, &mut rng()), Decision::Stop);
    }

    #[test]
    fn exponential_doubles_each_attempt() {
        let s = Schedule::exponential(Duration::from_millis(100), 2.0);
        assert_eq!(s.step(0, Duration::ZERO, &mut rng()), Decision::Continue(Duration::from_millis(100)));
        assert_eq!(s.step(1, Duration::ZERO, &mut rng()), Decision::Continue(Duration::from_millis(200)));
        assert_eq!(s.step(2, Duration::ZERO, &mut rng()), Decision::Continue(Duration::from_millis(400)));
    }

    #[test]
    fn bounded_stops_after_max_attempts() {
        let s = Schedule::fixed(Duration::from_millis(10)).bounded(3);
        assert!(matches!(s.step(2, Duration::ZERO, &mut rng()), Decision::Continue(_)));
        assert_eq!(s.step(3, Duration::ZERO, &mut rng()), Decision::Stop);
    }

    #[test]
    fn up_to_checks_elapsed_before_delay() {
        let s = Schedule::fixed(Duration::from_secs(1)).up_to(Duration::from_secs(5));
        assert_eq!(s.step(0, Duration::from_secs(6), &mut rng()), Decision::Stop);
        assert!(matches!(s.step(0, Duration::from_secs(1), &mut rng()), Decision::Continue(_)));
    }

    #[test]
    fn jittered_stays_within_bounds() {
        let s = Schedule::fixed(Duration::from_millis(1_000)).jittered(0.5);
        let mut r = rng();
        for attempt in 0..20 {
            if let Decision::Continue(d) = s.step(attempt, Duration::ZERO, &mut r) {
                assert!(d >= Duration::from_millis(500));
                assert!(d <= Duration::from_millis(1_500));
            } else {
                panic!("fixed schedule should never stop");
            }
        }
    }

    #[test]
    fn linear_grows_by_a_constant_increment() {
        let s = Schedule::linear(Duration::from_millis(100));
        assert_eq!(s.step(0, Duration::ZERO, &mut rng()), Decision::Continue(Duration::from_millis(100)));
        assert_eq!(s.step(1, Duration::ZERO, &mut rng()), Decision::Continue(Duration::from_millis(200)));
        assert_eq!(s.step(2, Duration::ZERO, &mut rng()), Decision::Continue(Duration::from_millis(300)));
    }
}

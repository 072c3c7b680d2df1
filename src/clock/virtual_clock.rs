use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::Mutex,
};

use futures::{
    channel::oneshot,
    future::BoxFuture,
    FutureExt,
};

use super::Clock;
use crate::duration::Duration;

struct Waiter {
    wake_at_millis: i64,
    seq: u64,
    sender: oneshot::Sender<()>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        (self.wake_at_millis, self.seq) == (other.wake_at_millis, other.seq)
    }
}
impl Eq for Waiter {}
impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap on
        // (wake_at, insertion order).
        (other.wake_at_millis, other.seq).cmp(&(self.wake_at_millis, self.seq))
    }
}

struct Inner {
    now_millis: i64,
    next_seq: u64,
    waiters: BinaryHeap<Waiter>,
    nano_tick: u64,
}

/// A deterministic clock for tests: time only moves when `advance` or
/// `set_time` is called. Matches §3.3's `VirtualClock`: `advance(by)`
/// drains all entries due by the new time in timestamp order, ties broken
/// by insertion order.
pub struct VirtualClock {
    inner: Mutex<Inner>,
}

impl VirtualClock {
    pub fn new() -> Self {
        VirtualClock {
            inner: Mutex::new(Inner {
                now_millis: 0,
                next_seq: 0,
                waiters: BinaryHeap::new(),
                nano_tick: 0,
            }),
        }
    }

    pub fn starting_at(millis: i64) -> Self {
        let clock = Self::new();
        clock.inner.lock().unwrap().now_millis = millis;
        clock
    }

    /// Advance virtual time by `by`, waking every sleeper whose deadline is
    /// now due, in non-decreasing timestamp order (ties by insertion order).
    /// Per §3.3, executing a due continuation advances `now` to exactly
    /// that continuation's `wake_at` before running it; the net effect after
    /// draining is that `now` lands exactly on `target`.
    pub fn advance(&self, by: Duration) {
        let target = {
            let inner = self.inner.lock().unwrap();
            inner.now_millis + by.as_millis_i64()
        };
        loop {
            let due = {
                let mut inner = self.inner.lock().unwrap();
                match inner.waiters.peek() {
                    Some(w) if w.wake_at_millis <= target => {
                        let w = inner.waiters.pop().unwrap();
                        inner.now_millis = w.wake_at_millis;
                        Some(w)
                    },
                    _ => None,
                }
            };
            match due {
                Some(w) => {
                    let _ = w.sender.send(());
                },
                None => break,
            }
        }
        let mut inner = self.inner.lock().unwrap();
        inner.now_millis = target;
    }

    /// Jump directly to `millis`, which must not be earlier than the current
    /// time (§3.3: "setTime(t) is only legal if t >= nowMillis"). Any
    /// sleeper due by `millis` is woken, same as `advance`.
    pub fn set_time(&self, millis: i64) {
        let by = {
            let inner = self.inner.lock().unwrap();
            assert!(
                millis >= inner.now_millis,
                "VirtualClock::set_time cannot move time backwards: {} < {}",
                millis,
                inner.now_millis
            );
            Duration::from_millis(millis - inner.now_millis)
        };
        self.advance(by);
    }

    pub fn now_millis(&self) -> i64 {
        self.inner.lock().unwrap().now_millis
    }

    pub fn is_idle(&self) -> bool {
        self.inner.lock().unwrap().waiters.is_empty()
    }

    /// The timestamp of the earliest not-yet-fired sleeper, if any. Used by
    /// the test execution strategy to advance time by exactly as much as
    /// needed to unblock the next waiter, rather than guessing a duration.
    pub fn next_wake_at(&self) -> Option<i64> {
        self.inner.lock().unwrap().waiters.peek().map(|w| w.wake_at_millis)
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn current_time_millis(&self) -> i64 {
        self.now_millis()
    }

    fn nano_time(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        // Give every caller a distinct, monotonically increasing value even
        // when virtual wall time has not moved, so ordering comparisons
        // between samples taken in the same tick remain meaningful.
        inner.nano_tick += 1;
        (inner.now_millis.max(0) as u64) * 1_000_000 + inner.nano_tick
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        if duration.is_negative() || duration.is_zero() {
            return futures::future::ready(()).boxed();
        }
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap();
        let wake_at_millis = inner.now_millis + duration.as_millis_i64();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.waiters.push(Waiter {
            wake_at_millis,
            seq,
            sender: tx,
        });
        rx.map(|_| ()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        future::Future,
        task::Context,
    };

    use futures::task::noop_waker;

    use super::*;

    fn poll_ready(fut: &mut BoxFuture<'static, ()>) -> bool {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        fut.as_mut().poll(&mut cx).is_ready()
    }

    #[test]
    fn advance_wakes_due_sleepers_in_order() {
        let clock = VirtualClock::new();
        let mut a = clock.sleep(Duration::from_millis(100));
        let mut b = clock.sleep(Duration::from_millis(200));
        assert!(!poll_ready(&mut a));
        assert!(!poll_ready(&mut b));

        clock.advance(Duration::from_millis(150));
        assert!(poll_ready(&mut a));
        assert!(!poll_ready(&mut b));
        assert_eq!(clock.now_millis(), 150);

        clock.advance(Duration::from_millis(50));
        assert!(poll_ready(&mut b));
        assert_eq!(clock.now_millis(), 200);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let clock = VirtualClock::new();
        let mut first = clock.sleep(Duration::from_millis(100));
        let mut second = clock.sleep(Duration::from_millis(100));
        clock.advance(Duration::from_millis(100));
        // Both are due at the same instant; both resolve once fully drained.
        assert!(poll_ready(&mut first));
        assert!(poll_ready(&mut second));
    }

    #[test]
    #[should_panic(expected = "cannot move time backwards")]
    fn set_time_rejects_going_backwards() {
        let clock = VirtualClock::new();
        clock.set_time(100);
        clock.set_time(50);
    }

    #[test]
    fn three_forked_sleeps_complete_in_ascending_order_on_advance() {
        let clock = VirtualClock::new();
        let mut futs: Vec<_> = [300, 100, 200]
            .into_iter()
            .map(|ms| clock.sleep(Duration::from_millis(ms)))
            .collect();
        clock.advance(Duration::from_millis(300));
        assert_eq!(clock.now_millis(), 300);
        for f in &mut futs {
            assert!(poll_ready(f));
        }
    }
}

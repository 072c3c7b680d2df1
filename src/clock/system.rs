use std::time::{
    Instant,
    SystemTime,
    UNIX_EPOCH,
};

use futures::FutureExt;

use super::{
    Clock,
    SleepFuture,
};
use crate::duration::Duration;

/// Real wall-clock and monotonic clock, backed by the OS. `sleep` blocks (or,
/// under the cooperative strategy, parks) the calling task for the
/// requested duration via a background timer thread.
#[derive(Clone, Copy, Default)]
pub struct SystemClock {
    epoch: Option<Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            epoch: Some(Instant::now()),
        }
    }
}

impl Clock for SystemClock {
    fn current_time_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_millis() as i64
    }

    fn nano_time(&self) -> u64 {
        let epoch = self.epoch.unwrap_or_else(Instant::now);
        Instant::now().saturating_duration_since(epoch).as_nanos() as u64
    }

    fn sleep(&self, duration: Duration) -> SleepFuture {
        let std_duration = duration.to_std_saturating();
        if std_duration.is_zero() {
            return futures::future::ready(()).boxed();
        }
        let (tx, rx) = futures::channel::oneshot::channel();
        std::thread::spawn(move || {
            std::thread::sleep(std_duration);
            let _ = tx.send(());
        });
        rx.map(|_| ()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use super::*;

    #[test]
    fn nano_time_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.nano_time();
        let b = clock.nano_time();
        assert!(b >= a);
    }

    #[test]
    fn sleep_zero_completes_immediately() {
        let clock = SystemClock::new();
        let mut fut = clock.sleep(Duration::ZERO);
        let waker = futures::task::noop_waker();
        let mut cx = std::task::Context::from_waker(&waker);
        assert!(fut.as_mut().poll(&mut cx).is_ready());
    }
}

//! Monotonic and virtual time. See §3.3.

mod system;
mod virtual_clock;

pub use system::SystemClock;
pub use virtual_clock::VirtualClock;

use std::{
    sync::Arc,
    time::SystemTime,
};

use futures::future::BoxFuture;

use crate::duration::Duration;

/// A registered sleeper: `Clock` implementations hand back a future that
/// resolves when the requested deadline has passed (per the clock's own
/// notion of "now").
pub type SleepFuture = BoxFuture<'static, ()>;

/// Abstracts system vs. virtual time. See §3.3: "a clock's time never
/// decreases"; `nanoTime` need not relate to wall time, only be monotonic.
pub trait Clock: Send + Sync + 'static {
    /// Milliseconds since the Unix epoch (virtualized for `VirtualClock`).
    fn current_time_millis(&self) -> i64;

    /// A monotonic nanosecond counter, unrelated to wall time.
    fn nano_time(&self) -> u64;

    /// Returns a future that resolves once `duration` has elapsed according
    /// to this clock.
    fn sleep(&self, duration: Duration) -> SleepFuture;

    fn system_time(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(self.current_time_millis().max(0) as u64)
    }
}

pub type DynClock = Arc<dyn Clock>;

//! The deterministic test strategy: cooperative interleaving (see
//! `cooperative.rs`) over a `VirtualClock` instead of real time, seeded RNG
//! for reproducibility. In the style of
//! `runtime::testing::runtime::TestDriver`: same `ChaCha12Rng::seed_from_u64`
//! default seed, same "advance the clock when stalled" escape from the
//! driving loop.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    cooperative::{
        drive,
        new_spawn_pair,
        Driver,
    },
    new_interpreter,
    Strategy,
};
use crate::{
    cause::Cause,
    clock::VirtualClock,
    context::Context,
    duration::Duration,
    effect::Effect,
    interpreter::Environment,
};

/// The default seed a `TestDriver` uses, chosen for reproducibility across
/// runs rather than any statistical property.
const DEFAULT_SEED: u64 = 0;

/// Cooperative interleaving plus a `VirtualClock`: forking, racing, and
/// sleeping all behave exactly as under `CooperativeStrategy`, except time
/// only moves when this strategy's driving loop (or a caller holding
/// `clock()`) advances it.
pub struct TestExecutionStrategy {
    driver: Mutex<Driver>,
    env: Environment,
    clock: Arc<VirtualClock>,
}

impl TestExecutionStrategy {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        let (spawn, driver) = new_spawn_pair();
        let clock = Arc::new(VirtualClock::new());
        let env = Environment {
            clock: clock.clone(),
            spawner: spawn,
            rng: super::seeded_rng(seed),
        };
        TestExecutionStrategy { driver, env, clock }
    }

    /// The underlying virtual clock, for tests that want to interleave
    /// manual `advance`/`set_time` calls with effects run on this strategy.
    pub fn clock(&self) -> Arc<VirtualClock> {
        self.clock.clone()
    }
}

impl Default for TestExecutionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for TestExecutionStrategy {
    fn environment(&self) -> Environment {
        self.env.clone()
    }

    fn block_on<A, E>(&self, effect: Effect<A, E>, context: Context) -> Result<A, Cause<E>>
    where
        A: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        let interp = new_interpreter(effect, context, self.env.clone());
        let mut driver = self.driver.lock();
        let clock = self.clock.clone();
        drive(interp, &mut driver, move || match clock.next_wake_at() {
            Some(wake_at) => {
                let now = clock.now_millis();
                clock.advance(Duration::from_millis((wake_at - now).max(0)));
                true
            },
            None => {
                panic!(
                    "effectual: test strategy deadlocked — nothing runnable and no pending \
                     virtual-clock sleeper; the program is waiting on something that will \
                     never complete"
                );
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        effect::Effect,
        runtime::Runtime,
    };

    #[test]
    fn a_sleep_resolves_instantly_in_virtual_time() {
        let rt = Runtime::new(TestExecutionStrategy::new());
        let effect: Effect<i32, String> = Effect::sleep(Duration::from_secs(3600)).as_value(42);
        assert_eq!(rt.run_safely(effect).unwrap(), 42);
    }

    #[test]
    fn sleeps_of_different_lengths_all_resolve_without_real_delay() {
        let rt = Runtime::new(TestExecutionStrategy::new());
        let program: Effect<Vec<i32>, String> = Effect::all(vec![
            Effect::sleep(Duration::from_millis(300)).as_value(1),
            Effect::sleep(Duration::from_millis(100)).as_value(2),
            Effect::sleep(Duration::from_millis(200)).as_value(3),
        ]);
        assert_eq!(rt.run_safely(program).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn with_seed_starts_the_clock_at_zero() {
        let strategy = TestExecutionStrategy::with_seed(42);
        assert_eq!(strategy.clock().now_millis(), 0);
    }

    /// Sample the clock, sleep, sample again, sleep again, sample a third
    /// time: each `run_safely` call drives the same strategy's virtual clock
    /// forward by exactly the sleep it's asked to wait out, with no real
    /// delay, so three samples taken around two sleeps land on `[0, 1000,
    /// 3000]` rather than anything wall-clock-dependent.
    #[test]
    fn three_samples_around_two_sleeps_land_on_the_expected_virtual_times() {
        let strategy = TestExecutionStrategy::with_seed(5);
        let clock = strategy.clock();
        let rt = Runtime::new(strategy);

        let mut samples = vec![clock.now_millis()];

        rt.run_safely(Effect::<(), String>::sleep(Duration::from_millis(1000))).unwrap();
        samples.push(clock.now_millis());

        rt.run_safely(Effect::<(), String>::sleep(Duration::from_millis(2000))).unwrap();
        samples.push(clock.now_millis());

        assert_eq!(samples, vec![0, 1000, 3000]);
    }
}

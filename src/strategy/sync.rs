//! The synchronous strategy: no cooperative interleaving at all. `fork` runs
//! the child to completion immediately, on the calling thread, before
//! `spawn` returns (§4.3: "fork is emulated by a single-threaded
//! scheduler that runs the child to completion on await"). This is the
//! simplification called out in `DESIGN.md`: the literal wording describes
//! running-on-await, but since nothing here can observe the difference
//! between "runs eagerly at fork time" and "runs the first time anyone
//! awaits it" without a second fiber to race it against, eager execution is
//! both simpler and strictly stronger (anyone who does await it still sees
//! the same completed result).

use std::sync::Arc;

use futures::future::BoxFuture;

use super::{
    new_interpreter,
    Strategy,
};
use crate::{
    cause::Cause,
    clock::SystemClock,
    context::Context,
    effect::Effect,
    interpreter::{
        Environment,
        RawSpawn,
    },
};

struct EagerSpawn;

impl RawSpawn for EagerSpawn {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        futures::executor::block_on(fut);
    }
}

/// Single fiber, real time, no interleaving. Matches §4.3's
/// `Synchronous` strategy: "useful on hosts without cooperative tasks".
pub struct SynchronousStrategy {
    env: Environment,
}

impl SynchronousStrategy {
    pub fn new() -> Self {
        SynchronousStrategy {
            env: Environment {
                clock: Arc::new(SystemClock::new()),
                spawner: Arc::new(EagerSpawn),
                rng: super::seeded_rng(rand::random()),
            },
        }
    }
}

impl Default for SynchronousStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for SynchronousStrategy {
    fn environment(&self) -> Environment {
        self.env.clone()
    }

    fn block_on<A, E>(&self, effect: Effect<A, E>, context: Context) -> Result<A, Cause<E>>
    where
        A: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        futures::executor::block_on(new_interpreter(effect, context, self.env.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn fork_runs_the_child_to_completion_before_returning() {
        let rt = Runtime::new(SynchronousStrategy::new());
        let observed = Arc::new(std::sync::Mutex::new(false));
        let for_child = observed.clone();
        let program: Effect<bool, String> = Effect::succeed(())
            .flat_map(move |_| {
                Effect::sync(move || {
                    *for_child.lock().unwrap() = true;
                })
                .fork()
            })
            .map(move |_fiber| *observed.lock().unwrap());
        assert!(rt.run_safely(program).unwrap());
    }
}

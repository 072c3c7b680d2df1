//! Execution strategies: the three interpreters-of-the-interpreter named in
//! §4.3. All three drive the same `Interpreter<E>`/`Node<E>` machinery
//! from `crate::interpreter`; they differ only in what `Environment` they
//! hand it (which `Clock`, which `RawSpawn`) and how they pump the top-level
//! future to completion.

mod cooperative;
mod sync;
mod test_strategy;

pub use cooperative::CooperativeStrategy;
pub use sync::SynchronousStrategy;
pub use test_strategy::TestExecutionStrategy;

use std::{
    future::Future,
    marker::PhantomData,
    pin::Pin,
    sync::{
        Arc,
        Mutex,
    },
    task::{
        Context as TaskContext,
        Poll,
    },
};

use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

use crate::{
    cause::Cause,
    context::Context,
    effect::{
        node::AnyBox,
        Effect,
    },
    interpreter::{
        Environment,
        Interpreter,
        PanicGuarded,
    },
    scope::{
        FiberFailure,
        InterruptFlag,
    },
};

/// Everything a `Runtime` needs from its chosen strategy: an `Environment`
/// to interpret effects against, and a way to drive the top-level effect to
/// completion. `block_on` is the only place a strategy's own scheduling
/// discipline (blocking, cooperative polling, virtual-time stepping) is
/// exercised; everything else about running an effect is shared, strategy-
/// independent interpreter logic.
pub trait Strategy: Send + Sync + 'static {
    fn environment(&self) -> Environment;

    /// Run `effect` to completion under `context`, blocking the calling
    /// thread until it's done. Every strategy is ultimately synchronous at
    /// this boundary (§4.6's `run`/`runSafely`/`runResult` are plain
    /// blocking calls), even though what happens *inside* may be cooperative
    /// task interleaving or virtual-time stepping.
    fn block_on<A, E>(&self, effect: Effect<A, E>, context: Context) -> Result<A, Cause<E>>
    where
        A: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static;
}

pub(crate) fn seeded_rng(seed: u64) -> Arc<Mutex<ChaCha12Rng>> {
    Arc::new(Mutex::new(ChaCha12Rng::seed_from_u64(seed)))
}

/// Wraps an `Interpreter<E>` (which only knows it's producing an `AnyBox`)
/// to recover the statically-typed `A` at the one place every strategy's
/// `block_on` actually needs it, same pattern as `Effect::fork`/`all_par`'s
/// call-site `.map`. Also panic-guards the top-level run the same way
/// `spawn_child` guards a forked fiber, so a panicking `sync`/`sync_try`
/// thunk at the root is reported as a `Cause::Die`, not a raw unwind out of
/// `Runtime::run_safely`.
pub(crate) struct TypedRun<A, E> {
    inner: PanicGuarded<Interpreter<E>>,
    _marker: PhantomData<fn() -> A>,
}

pub(crate) fn new_interpreter<A, E>(effect: Effect<A, E>, context: Context, env: Environment) -> TypedRun<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let node = effect.into_node();
    let interp = Interpreter::new(node, context, env, InterruptFlag::new());
    TypedRun {
        inner: PanicGuarded { inner: interp },
        _marker: PhantomData,
    }
}

impl<A, E> Future for TypedRun<A, E>
where
    A: 'static,
    E: Clone + Send + Sync + 'static,
{
    type Output = Result<A, Cause<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(boxed)) => Poll::Ready(Ok(*downcast::<A>(boxed))),
            Poll::Ready(Err(FiberFailure::Cause(cause))) => Poll::Ready(Err(cause)),
            Poll::Ready(Err(FiberFailure::Panicked(payload))) => Poll::Ready(Err(Cause::Die(payload))),
        }
    }
}

fn downcast<A: 'static>(boxed: AnyBox) -> Box<A> {
    boxed
        .downcast::<A>()
        .unwrap_or_else(|_| panic!("effectual: internal type-erasure invariant violated"))
}

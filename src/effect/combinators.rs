//! Method-style combinators on `Effect<A, E>`. See §4.1.

use std::{
    marker::PhantomData,
    sync::Arc,
};

use super::{
    node::{
        AnyBox,
        FlatMapFn,
        MapFn,
        Node,
        RawCompletion,
    },
    Effect,
};
use crate::{
    cause::Cause,
    context::Context,
    duration::Duration,
    schedule::Schedule,
    scope::Scope,
};

fn downcast<T: 'static>(boxed: AnyBox) -> T {
    *boxed
        .downcast::<T>()
        .unwrap_or_else(|_| panic!("effectual: internal type-erasure invariant violated"))
}

impl<A, E> Effect<A, E>
where
    A: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Transform the success value. `f` runs on every interpretation
    /// (including retries of an enclosing effect), so it should be a pure
    /// function of its input.
    pub fn map<B>(self, f: impl Fn(A) -> B + Send + Sync + 'static) -> Effect<B, E>
    where
        B: Send + Sync + 'static,
    {
        let map_fn: MapFn = Arc::new(move |boxed| Box::new(f(downcast::<A>(boxed))) as AnyBox);
        Effect::from_node(Node::Map(self.node, map_fn))
    }

    /// Sequence onto another effect depending on this one's result. This is
    /// the workhorse that the trampoline interpreter (`crate::interpreter`)
    /// reduces iteratively instead of via native recursion, however deep the
    /// chain is built.
    pub fn flat_map<B>(self, f: impl Fn(A) -> Effect<B, E> + Send + Sync + 'static) -> Effect<B, E>
    where
        B: Send + Sync + 'static,
    {
        let flat_map_fn: FlatMapFn<E> = Arc::new(move |boxed| f(downcast::<A>(boxed)).into_node());
        Effect::from_node(Node::FlatMap(self.node, flat_map_fn))
    }

    /// Discard this effect's value and replace it with `value`.
    pub fn as_value<B>(self, value: B) -> Effect<B, E>
    where
        B: Clone + Send + Sync + 'static,
    {
        self.flat_map(move |_| Effect::succeed(value.clone()))
    }

    /// Discard this effect's success value.
    pub fn unit(self) -> Effect<(), E> {
        self.map(|_| ())
    }

    /// Run `f` for its side effect, keeping this effect's original value.
    pub fn tap<B>(self, f: impl Fn(&A) -> Effect<B, E> + Send + Sync + 'static) -> Effect<A, E>
    where
        A: Clone,
        B: Send + Sync + 'static,
    {
        self.flat_map(move |a| f(&a).map(move |_| a.clone()))
    }

    /// Run two effects in sequence, keeping both results.
    pub fn zip<B>(self, other: Effect<B, E>) -> Effect<(A, B), E>
    where
        A: Clone,
        B: Send + Sync + 'static,
    {
        self.flat_map(move |a| other.clone().map(move |b| (a.clone(), b)))
    }

    /// Run a finalizer unconditionally once this effect completes, whether
    /// it succeeded, failed, or was interrupted. Interrupting a fiber while
    /// its finalizer is running does not abort the finalizer (§5).
    pub fn ensuring(self, finalizer: impl Fn() -> Effect<(), E> + Send + Sync + 'static) -> Effect<A, E> {
        let thunk: crate::effect::node::FinalizerThunk<E> = Arc::new(move || finalizer().into_node());
        Effect::from_node(Node::Ensuring(self.node, thunk))
    }

    /// Bind this effect to a freshly created `Scope`, whose finalizers run
    /// (LIFO) when `body`'s returned effect completes (§3.5).
    pub fn scoped(body: impl Fn(Scope<E>) -> Effect<A, E> + Send + Sync + 'static) -> Effect<A, E>
    where
        E: Clone,
    {
        let thunk: crate::effect::node::ScopedThunk<E> = Arc::new(move |scope| body(scope).into_node());
        Effect::from_node(Node::Scoped(thunk))
    }

    /// Fail with `Cause::timeout()` if this effect has not completed within
    /// `duration`. Implemented as sugar over `race` against a `Sleep`
    /// (§4.1's `Timeout` desugars to "race against the clock"), not a
    /// bespoke clock-registration mechanism.
    pub fn timeout(self, duration: Duration) -> Effect<A, E>
    where
        E: Clone,
    {
        Effect::from_node(Node::Timeout(self.node, duration))
    }

    /// Re-run this effect according to `schedule` whenever it fails, until
    /// the schedule says to stop (§3.6). The underlying `Node` tree is
    /// shared (via `Arc`) across attempts, not rebuilt; see the module docs
    /// for why every leaf closure is `Fn`, not `FnOnce`.
    pub fn retry(self, schedule: Schedule) -> Effect<A, E> {
        Effect::from_node(Node::Retry(self.node, schedule))
    }

    /// Bind a `Context` to this effect, satisfying any `service` lookups
    /// within it (§3.4). A nested `provide` shadows an outer one for
    /// the services it rebinds.
    pub fn provide(self, context: Context) -> Effect<A, E> {
        Effect::from_node(Node::Provide(self.node, context))
    }

    /// Start this effect running on its own fiber, returning immediately
    /// with a handle (§3.5). The forked fiber inherits the parent's
    /// context and clock.
    ///
    /// The interpreter's `Fork` dispatch only ever knows `E`, not `A` (it
    /// operates on type-erased `Node<E>` trees), so it hands back a raw
    /// `Arc<FiberState<E>>` rather than a typed `Fiber<A, E>`. This `.map`
    /// recovers the static type at the one place `A` is actually known: the
    /// call site.
    pub fn fork(self) -> Effect<crate::scope::Fiber<A, E>, E>
    where
        A: Clone,
        E: Clone,
    {
        Effect::<Arc<crate::scope::FiberState<E>>, E>::from_node(Node::Fork(self.node))
            .map(crate::scope::Fiber::from_raw)
    }
}

impl<A, E> Effect<A, E>
where
    A: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Recover from a failure whose cause matches `predicate`, producing a
    /// replacement effect. A cause that doesn't match propagates unchanged.
    pub fn catch(
        self,
        predicate: impl Fn(&E) -> bool + Send + Sync + 'static,
        handler: impl Fn(E) -> Effect<A, E> + Send + Sync + 'static,
    ) -> Effect<A, E> {
        let matcher = Arc::new(move |cause: &Cause<E>| match cause {
            Cause::Fail(e) => predicate(e),
            _ => false,
        });
        let handle = Arc::new(move |cause: Cause<E>| match cause {
            Cause::Fail(e) => handler(e).into_node(),
            other => Effect::fail_cause(other).into_node(),
        });
        Effect::from_node(Node::Catch(self.node, matcher, handle))
    }

    /// Recover from any failure, including interruption, given the full
    /// structured `Cause<E>` (§3.2's "Catch only consumes a cause whose
    /// leaf matches" taken to its most permissive predicate).
    pub fn catch_cause(self, handler: impl Fn(Cause<E>) -> Effect<A, E> + Send + Sync + 'static) -> Effect<A, E> {
        let matcher = Arc::new(|_: &Cause<E>| true);
        let handle = Arc::new(move |cause: Cause<E>| handler(cause).into_node());
        Effect::from_node(Node::Catch(self.node, matcher, handle))
    }

    /// If this effect fails (for any reason other than interruption), fall
    /// back to `other`.
    pub fn or_else(self, other: impl Fn() -> Effect<A, E> + Send + Sync + 'static) -> Effect<A, E> {
        let matcher = Arc::new(|cause: &Cause<E>| !cause.is_interrupt());
        let handle = Arc::new(move |_: Cause<E>| other().into_node());
        Effect::from_node(Node::Catch(self.node, matcher, handle))
    }
}

impl<A, E> Effect<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Run every effect to completion in order, collecting their results.
    /// Stops at the first failure (§4.1 `all`).
    pub fn all(effects: Vec<Effect<A, E>>) -> Effect<Vec<A>, E> {
        effects.into_iter().fold(Effect::succeed(Vec::new()), |acc, next| {
            acc.flat_map(move |mut results: Vec<A>| {
                next.clone().map(move |a| {
                    results.push(a);
                    results
                })
            })
        })
    }

    /// Run every effect on its own fiber and await all of them, collecting
    /// results in input order. On the first failure, every sibling fiber
    /// still running is interrupted and the first failure's cause is
    /// reported (§4.1 `allPar`).
    ///
    /// `ParAll`'s dispatch produces a `Vec<AnyBox>` (it doesn't know `A`
    /// either); this downcasts each element back at the call site, same as
    /// `fork`.
    pub fn all_par(effects: Vec<Effect<A, E>>) -> Effect<Vec<A>, E> {
        let nodes = effects.into_iter().map(|e| e.into_node()).collect();
        Effect::<Vec<AnyBox>, E>::from_node(Node::ParAll(nodes)).map(|boxed: Vec<AnyBox>| {
            boxed.into_iter().map(downcast::<A>).collect()
        })
    }

    /// Run every effect concurrently; the first to complete (success or
    /// failure) wins, and every other sibling is interrupted (§4.1
    /// `race`).
    pub fn race(effects: Vec<Effect<A, E>>) -> Effect<A, E> {
        let nodes = effects.into_iter().map(|e| e.into_node()).collect();
        Effect::from_node(Node::Race(nodes))
    }
}

/// The handle passed to an `async_effect` registrar. Must be resolved
/// exactly once, from any thread (§3.1 `Async`); a second call panics
/// in debug builds and is logged-and-ignored in release (§9).
pub struct AsyncCompletion<A, E> {
    raw: RawCompletion<E>,
    _marker: PhantomData<fn(A)>,
}

impl<A, E> Clone for AsyncCompletion<A, E> {
    fn clone(&self) -> Self {
        AsyncCompletion {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<A: Send + Sync + 'static, E> AsyncCompletion<A, E> {
    pub(crate) fn new(raw: RawCompletion<E>) -> Self {
        AsyncCompletion {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn succeed(&self, value: A) {
        self.raw.complete(Ok(Box::new(value) as AnyBox));
    }

    pub fn fail(&self, cause: Cause<E>) {
        self.raw.complete(Err(cause));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        runtime::Runtime,
        strategy::SynchronousStrategy,
    };

    fn run<A: Clone + Send + Sync + 'static>(effect: Effect<A, String>) -> A {
        Runtime::new(SynchronousStrategy::new()).run(effect)
    }

    #[test]
    fn left_identity() {
        let f = |n: i32| Effect::<i32, String>::succeed(n * 2);
        assert_eq!(run(Effect::succeed(21).flat_map(f)), run(f(21)));
    }

    #[test]
    fn right_identity() {
        let m = Effect::<i32, String>::succeed(7);
        assert_eq!(run(m.clone().flat_map(Effect::succeed)), run(m));
    }

    #[test]
    fn associativity() {
        let m = Effect::<i32, String>::succeed(1);
        let f = |n: i32| Effect::<i32, String>::succeed(n + 1);
        let g = |n: i32| Effect::<i32, String>::succeed(n * 3);
        let left = m.clone().flat_map(f).flat_map(g);
        let right = m.flat_map(move |n| f(n).flat_map(g));
        assert_eq!(run(left), run(right));
    }

    #[test]
    fn map_is_flat_map_with_succeed() {
        let m = Effect::<i32, String>::succeed(4);
        let via_map = run(m.clone().map(|n| n + 1));
        let via_flat_map = run(m.flat_map(|n| Effect::succeed(n + 1)));
        assert_eq!(via_map, via_flat_map);
    }

    #[test]
    fn catch_recovers_from_a_matching_failure() {
        let m: Effect<i32, String> = Effect::fail("nope".to_string()).catch(|_| true, |_| Effect::succeed(9));
        assert_eq!(run(m), 9);
    }

    #[test]
    fn or_else_falls_back_but_not_on_interruption() {
        let recovered: Effect<i32, String> = Effect::fail("x".to_string()).or_else(|| Effect::succeed(1));
        assert_eq!(run(recovered), 1);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig {
            cases: 64 * crate::env::env_config("EFFECTUAL_PROPTEST_MULTIPLIER", 1),
            failure_persistence: None,
            ..proptest::prelude::ProptestConfig::default()
        })]

        #[test]
        fn prop_left_identity(n in proptest::prelude::any::<i32>(), k in proptest::prelude::any::<i32>()) {
            let f = move |x: i32| Effect::<i32, String>::succeed(x.wrapping_add(k));
            proptest::prop_assert_eq!(run(Effect::succeed(n).flat_map(f)), run(f(n)));
        }

        #[test]
        fn prop_right_identity(n in proptest::prelude::any::<i32>()) {
            let m = Effect::<i32, String>::succeed(n);
            proptest::prop_assert_eq!(run(m.clone().flat_map(Effect::succeed)), run(m));
        }

        #[test]
        fn prop_associativity(n in proptest::prelude::any::<i32>(), a in proptest::prelude::any::<i32>(), b in proptest::prelude::any::<i32>()) {
            let m = Effect::<i32, String>::succeed(n);
            let f = move |x: i32| Effect::<i32, String>::succeed(x.wrapping_add(a));
            let g = move |x: i32| Effect::<i32, String>::succeed(x.wrapping_mul(b));
            let left = m.clone().flat_map(f).flat_map(g);
            let right = m.flat_map(move |x| f(x).flat_map(g));
            proptest::prop_assert_eq!(run(left), run(right));
        }
    }
}

//! Free-function and associated-function constructors. See §3.1/§4.1.

use std::sync::Arc;

use super::{
    node::{
        AnyBox,
        Node,
        RawCompletion,
    },
    Effect,
};
use crate::{
    cause::Cause,
    clock::DynClock,
    context::{
        Context,
        ServiceTag,
    },
    duration::Duration,
};

impl<A, E> Effect<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// An effect that always succeeds with `value`.
    pub fn succeed(value: A) -> Self {
        Effect::from_node(Node::Succeed(Arc::new(move || Box::new(value.clone()) as AnyBox)))
    }

    /// An effect that always fails with `error`.
    pub fn fail(error: E) -> Self {
        Effect::from_node(Node::Fail(Cause::fail(error)))
    }

    /// An effect that always fails with the given structured `cause`
    /// directly, bypassing the usual `Cause::fail` wrapping. Useful for
    /// re-raising a cause captured by `catch_cause`.
    pub fn fail_cause(cause: Cause<E>) -> Self {
        Effect::from_node(Node::Fail(cause))
    }

    /// An effect that never completes. Useful as the losing side of a
    /// `race`, or to model a server's main loop.
    pub fn never() -> Self {
        Effect::from_node(Node::Async(Arc::new(|_completion| {
            // Intentionally never calls `complete`.
        })))
    }

    /// Lazily defer to another effect, rebuilt fresh on every interpretation
    /// (including every retry attempt). The standard building block for
    /// stack-safe recursion (§9's "cyclic closures").
    pub fn suspend(thunk: impl Fn() -> Effect<A, E> + Send + Sync + 'static) -> Self {
        Effect::from_node(Node::Suspend(Arc::new(move || thunk().into_node())))
    }
}

impl<A, E> Effect<A, E>
where
    A: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Run a fallible synchronous computation whose errors are already a
    /// typed `E`. `thunk` must be safely re-runnable: a `retry`'d `sync`
    /// effect calls it again on every attempt.
    pub fn sync_try(thunk: impl Fn() -> Result<A, E> + Send + Sync + 'static) -> Self {
        Effect::from_node(Node::Sync(Arc::new(move || {
            thunk().map(|a| Box::new(a) as AnyBox).map_err(Cause::fail)
        })))
    }

    /// Run a synchronous computation that cannot fail.
    pub fn sync(thunk: impl Fn() -> A + Send + Sync + 'static) -> Self {
        Effect::sync_try(move || Ok(thunk()))
    }
}

/// Registers a callback-based asynchronous operation. `registrar` is handed
/// an `AsyncCompletion` it must call exactly once, from any thread, to
/// resolve the effect (§3.1 `Async`).
pub fn async_effect<A, E>(
    registrar: impl Fn(super::combinators::AsyncCompletion<A, E>) + Send + Sync + 'static,
) -> Effect<A, E>
where
    A: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    Effect::from_node(Node::Async(Arc::new(move |raw: RawCompletion<E>| {
        registrar(super::combinators::AsyncCompletion::new(raw));
    })))
}

impl<A, E> Effect<A, E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Look up a service bound in the active `Context`, failing with a
    /// `Cause::Die` wrapping `ServiceNotFound` if it isn't present — a
    /// missing binding is a wiring defect, not a typed `E` the caller's
    /// domain logic is expected to handle. Returns the bound value behind
    /// an `Arc`, matching `Context::get`.
    pub fn service(tag: ServiceTag<A>) -> Effect<Arc<A>, E>
    where
        A: Send + Sync + 'static,
    {
        let tag_for_lookup = tag;
        Effect::from_node(Node::Service(
            Arc::new(move |ctx: &Context| ctx.get(tag_for_lookup).map(|arc| Box::new(arc) as AnyBox)),
            tag.name(),
        ))
    }
}

impl<E> Effect<(), E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Suspend the fiber until `duration` has elapsed on the active clock.
    pub fn sleep(duration: Duration) -> Self {
        Effect::from_node(Node::Sleep(duration))
    }
}

impl<A, E> Effect<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn from_option(opt: Option<A>, if_none: impl Fn() -> E + Send + Sync + 'static) -> Self {
        match opt {
            Some(a) => Effect::succeed(a),
            None => Effect::from_node(Node::Sync(Arc::new(move || Err(Cause::fail(if_none()))))),
        }
    }

    pub fn from_either(result: Result<A, E>) -> Self {
        match result {
            Ok(a) => Effect::succeed(a),
            Err(e) => Effect::fail(e),
        }
    }

    /// Run `effect` only if `condition` holds, otherwise succeed with `None`.
    pub fn when(
        condition: bool,
        effect: impl Fn() -> Effect<A, E> + Send + Sync + 'static,
    ) -> Effect<Option<A>, E> {
        if condition {
            effect().map(Some)
        } else {
            Effect::succeed(None)
        }
    }
}

/// Exposes the clock currently bound for the running strategy as a service,
/// so effects can read the clock they were actually interpreted under
/// (system vs. virtual) without threading it through explicitly.
pub static CLOCK_TAG: std::sync::LazyLock<ServiceTag<DynClock>> =
    std::sync::LazyLock::new(|| ServiceTag::new("effectual::Clock"));

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;
    use crate::{
        runtime::Runtime,
        strategy::SynchronousStrategy,
    };

    #[test]
    fn service_fails_cleanly_instead_of_panicking_on_a_missing_binding() {
        static PORT: LazyLock<ServiceTag<u32>> = LazyLock::new(|| ServiceTag::new("Port"));

        let rt = Runtime::new(SynchronousStrategy::new());
        let program: Effect<Arc<u32>, String> = Effect::service(*PORT);
        let cause = rt.run_safely(program).unwrap_err();
        assert!(matches!(cause, Cause::Die(_)));
    }

    #[test]
    fn service_resolves_a_bound_value() {
        static PORT: LazyLock<ServiceTag<u32>> = LazyLock::new(|| ServiceTag::new("Port"));

        let rt = Runtime::new(SynchronousStrategy::new());
        let program: Effect<Arc<u32>, String> = Effect::service(*PORT).provide(Context::empty().with(*PORT, 8080));
        assert_eq!(*rt.run_safely(program).unwrap(), 8080);
    }
}

//! The `Runtime` façade: §4.6's three entry points, built from a root
//! `Context` and a `Strategy`. Follows the common pattern of a small
//! concrete handle wrapping a generic backing implementation (`TokioRuntime`/
//! `TestRuntime` both implement `common::runtime::Runtime`); here the
//! backing implementation is `crate::strategy::Strategy`.

use std::{
    fmt,
    sync::OnceLock,
};

use crate::{
    cause::Cause,
    context::Context,
    duration::Duration,
    effect::Effect,
    strategy::{
        CooperativeStrategy,
        Strategy,
    },
};

/// An alternative result carrier for callers who prefer `is_success`/
/// `is_failure`/`value`/`cause` accessors over matching on `Result`
/// (§4.6's `runResult`). Functionally identical to `Result<A, Cause<E>>`;
/// kept as a distinct type only because this crate's surface asks for a distinct
/// surface, the way some of its target languages distinguish `Either` from
/// a dedicated `Result` carrier — Rust's own `Result` already plays both
/// roles, so `run_safely` returns it directly and this wraps the same value.
pub struct RunOutcome<A, E> {
    inner: Result<A, Cause<E>>,
}

impl<A, E> RunOutcome<A, E> {
    pub fn is_success(&self) -> bool {
        self.inner.is_ok()
    }

    pub fn is_failure(&self) -> bool {
        self.inner.is_err()
    }

    pub fn value(self) -> Option<A> {
        self.inner.ok()
    }

    pub fn cause(self) -> Option<Cause<E>> {
        self.inner.err()
    }

    pub fn into_result(self) -> Result<A, Cause<E>> {
        self.inner
    }
}

/// Runs `Effect`s under a chosen `Strategy` and root `Context`. Cheap to
/// construct; strategies that hold real executor state (`CooperativeStrategy`,
/// `TestExecutionStrategy`) are meant to be built once and reused rather than
/// constructed fresh per call.
pub struct Runtime<S> {
    strategy: S,
    context: Context,
}

impl<S: Strategy> Runtime<S> {
    pub fn new(strategy: S) -> Self {
        Runtime {
            strategy,
            context: Context::empty(),
        }
    }

    /// Build a new runtime that merges `context` into this one's (right-
    /// biased, same as `Context::merge`); the original is left untouched.
    pub fn with_context(&self, context: Context) -> Self
    where
        S: Clone,
    {
        Runtime {
            strategy: self.strategy.clone(),
            context: self.context.merge(&context),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Run `effect` to completion, panicking on failure. For a library
    /// without a "throw a sum type" idiom, §4.6/§7 allow a composite
    /// wrapper; `Cause::to_exception` is exactly that collapse.
    pub fn run<A, E>(&self, effect: Effect<A, E>) -> A
    where
        A: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + fmt::Display + fmt::Debug + 'static,
    {
        match self.run_safely(effect) {
            Ok(value) => value,
            Err(cause) => panic!("effectual: effect failed: {}", cause.to_exception()),
        }
    }

    /// Run `effect` to completion, never panicking.
    pub fn run_safely<A, E>(&self, effect: Effect<A, E>) -> Result<A, Cause<E>>
    where
        A: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        self.strategy.block_on(effect, self.context.clone())
    }

    /// Same as `run_safely`, wrapped in the `is_success`/`value`/`cause`
    /// carrier instead of a bare `Result`.
    pub fn run_result<A, E>(&self, effect: Effect<A, E>) -> RunOutcome<A, E>
    where
        A: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        RunOutcome {
            inner: self.run_safely(effect),
        }
    }

    /// Run a bare future-shaped effect with a one-off timeout without
    /// building a `.timeout()` onto the `Effect` tree yourself. Layered on
    /// `Effect::timeout` (this crate's added `with_timeout` convenience),
    /// not a second cancellation mechanism.
    pub fn run_with_timeout<A, E>(&self, effect: Effect<A, E>, duration: Duration) -> Result<A, Cause<E>>
    where
        A: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        self.run_safely(effect.timeout(duration))
    }
}

static DEFAULT_RUNTIME: OnceLock<Runtime<CooperativeStrategy>> = OnceLock::new();

/// The process-wide default runtime (§6: "an optional default runtime
/// singleton... lazily created on first use"). Backed by `CooperativeStrategy`
/// since it needs no explicit driving and works without a test harness.
pub fn default_runtime() -> &'static Runtime<CooperativeStrategy> {
    DEFAULT_RUNTIME.get_or_init(|| Runtime::new(CooperativeStrategy::new()))
}

/// Replace the default runtime before anything has observed it. Returns the
/// rejected runtime if `default_runtime` was already called (§6:
/// "replaceable only before first use").
pub fn set_default_runtime(runtime: Runtime<CooperativeStrategy>) -> Result<(), Runtime<CooperativeStrategy>> {
    DEFAULT_RUNTIME.set(runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::SynchronousStrategy;

    #[test]
    fn run_safely_returns_ok_on_success() {
        let rt = Runtime::new(SynchronousStrategy::new());
        let effect: Effect<i32, String> = Effect::succeed(5).map(|n| n * 2);
        assert_eq!(rt.run_safely(effect).unwrap(), 10);
    }

    #[test]
    fn run_safely_returns_the_cause_on_failure() {
        let rt = Runtime::new(SynchronousStrategy::new());
        let effect: Effect<i32, String> = Effect::fail("boom".to_string());
        let cause = rt.run_safely(effect).unwrap_err();
        assert!(cause.contains(|e| e == "boom"));
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn run_panics_on_failure() {
        let rt = Runtime::new(SynchronousStrategy::new());
        let effect: Effect<i32, String> = Effect::fail("boom".to_string());
        rt.run(effect);
    }

    #[test]
    fn run_result_reports_success_and_failure() {
        let rt = Runtime::new(SynchronousStrategy::new());
        let ok: Effect<i32, String> = Effect::succeed(1);
        let outcome = rt.run_result(ok);
        assert!(outcome.is_success());
        assert_eq!(outcome.value(), Some(1));

        let err: Effect<i32, String> = Effect::fail("nope".to_string());
        let outcome = rt.run_result(err);
        assert!(outcome.is_failure());
        assert!(outcome.cause().is_some());
    }

    #[test]
    fn default_runtime_is_reused_across_calls() {
        let a = default_runtime() as *const _;
        let b = default_runtime() as *const _;
        assert_eq!(a, b);
    }
}

//! Structured concurrency: `Scope` owns finalizers, `Fiber` is a handle to a
//! running computation. See §3.5.

use std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Arc,
    Mutex,
};

use crate::{
    cause::Cause,
    effect::node::{
        FinalizerThunk,
        Node,
    },
};

struct ScopeInner<E> {
    finalizers: Vec<FinalizerThunk<E>>,
    closed: bool,
}

/// Owns an ordered list of finalizers and closes them LIFO. A finalizer
/// registered with `add` after `close` has already run is rejected: per
/// §3.5, late registration is a `ScopeClosed` error, not a panic, so callers
/// get a recoverable failure rather than undefined behavior.
pub struct Scope<E> {
    inner: Arc<Mutex<ScopeInner<E>>>,
}

impl<E> Clone for Scope<E> {
    fn clone(&self) -> Self {
        Scope {
            inner: self.inner.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("scope is already closed")]
pub struct ScopeClosed;

impl<E> Scope<E> {
    pub fn new() -> Self {
        Scope {
            inner: Arc::new(Mutex::new(ScopeInner {
                finalizers: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Register a finalizer effect. Finalizers run in reverse (LIFO)
    /// registration order when the scope closes.
    pub fn add(&self, finalizer: FinalizerThunk<E>) -> Result<(), ScopeClosed> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(ScopeClosed);
        }
        inner.finalizers.push(finalizer);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Build the internal effect that runs every registered finalizer, most
    /// recently added first, collecting every failure into a `Sequential`
    /// cause (§3.5: "no finalizer is skipped because an earlier one
    /// failed"). Marks the scope closed immediately so later `add` calls are
    /// rejected even before the returned effect is interpreted.
    pub fn close(&self) -> Arc<Node<E>> {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        let mut finalizers = std::mem::take(&mut inner.finalizers);
        finalizers.reverse();
        Arc::new(Node::RunFinalizers(finalizers))
    }
}

impl<E> Default for Scope<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a fiber stopped running early. Mirrors `Cause::Interrupt`'s two
/// reasons so callers of `Fiber::interrupt` and timeout plumbing share one
/// vocabulary (§7).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterruptReason {
    Cancelled,
    Timeout,
}

impl From<InterruptReason> for crate::cause::InterruptReason {
    fn from(r: InterruptReason) -> Self {
        match r {
            InterruptReason::Cancelled => crate::cause::InterruptReason::Cancelled,
            InterruptReason::Timeout => crate::cause::InterruptReason::Timeout,
        }
    }
}

/// Shared interruption flag checked by the interpreter at every suspension
/// point (§5). Setting it does not itself stop anything; the fiber
/// notices on its next poll.
#[derive(Clone, Default)]
pub(crate) struct InterruptFlag {
    flag: Arc<Mutex<Option<InterruptReason>>>,
}

impl InterruptFlag {
    pub(crate) fn new() -> Self {
        InterruptFlag::default()
    }

    pub(crate) fn trigger(&self, reason: InterruptReason) {
        let mut guard = self.flag.lock().unwrap();
        if guard.is_none() {
            *guard = Some(reason);
        }
    }

    pub(crate) fn get(&self) -> Option<InterruptReason> {
        *self.flag.lock().unwrap()
    }
}

/// A fiber's outcome, distinguishing a typed/interrupted failure from a Rust
/// panic. Panics never become a `Cause<E>`: only fork/fiber boundaries catch
/// them, matching how a task runtime typically reports `JoinError::Panicked`
/// separately from an ordinary task error.
pub enum FiberFailure<E> {
    Cause(Cause<E>),
    Panicked(Arc<anyhow::Error>),
}

impl<E: std::fmt::Debug> std::fmt::Debug for FiberFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FiberFailure::Cause(c) => write!(f, "FiberFailure::Cause({c:?})"),
            FiberFailure::Panicked(e) => write!(f, "FiberFailure::Panicked({e:?})"),
        }
    }
}

impl<E> Clone for FiberFailure<E>
where
    E: Clone,
{
    fn clone(&self) -> Self {
        match self {
            FiberFailure::Cause(c) => FiberFailure::Cause(c.clone()),
            FiberFailure::Panicked(e) => FiberFailure::Panicked(e.clone()),
        }
    }
}

/// Type-erased fiber completion state. Erased over `A` (not just `E`)
/// because the trampoline interpreter that populates it (`crate::interpreter`)
/// never knows the eventual success type of a forked sub-tree — only the
/// public `Fiber<A, E>` facade, built back at the `Effect::fork` call site
/// where `A` is statically known, recovers it.
pub(crate) struct FiberState<E> {
    pub(crate) result: Mutex<Option<Result<crate::effect::node::AnyBox, FiberFailure<E>>>>,
    pub(crate) interrupt: InterruptFlag,
    pub(crate) done: AtomicBool,
    pub(crate) wakers: Mutex<Vec<std::task::Waker>>,
}

impl<E> FiberState<E> {
    pub(crate) fn new() -> Self {
        FiberState {
            result: Mutex::new(None),
            interrupt: InterruptFlag::new(),
            done: AtomicBool::new(false),
            wakers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn complete(&self, result: Result<crate::effect::node::AnyBox, FiberFailure<E>>) {
        *self.result.lock().unwrap() = Some(result);
        self.done.store(true, Ordering::SeqCst);
        for waker in self.wakers.lock().unwrap().drain(..) {
            waker.wake();
        }
    }

    pub(crate) fn register_waker(&self, waker: &std::task::Waker) {
        self.wakers.lock().unwrap().push(waker.clone());
    }

    /// Consume the result the moment it's available. Only safe for
    /// single-owner internal joins (`ParAll`/`Race`'s own bookkeeping); the
    /// public `Fiber::join` uses the non-consuming `result.lock()` path
    /// above instead, since a public handle may be joined more than once.
    pub(crate) fn poll_take(
        self: &Arc<Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<crate::effect::node::AnyBox, FiberFailure<E>>> {
        if let Some(v) = self.result.lock().unwrap().take() {
            return std::task::Poll::Ready(v);
        }
        self.register_waker(cx.waker());
        if let Some(v) = self.result.lock().unwrap().take() {
            return std::task::Poll::Ready(v);
        }
        std::task::Poll::Pending
    }
}

/// A handle to a running (or finished) fiber, forked off by
/// `Effect::fork`/`Effect::par_all`/`Effect::race` (§3.5).
pub struct Fiber<A, E> {
    pub(crate) state: Arc<FiberState<E>>,
    pub(crate) _marker: std::marker::PhantomData<fn() -> A>,
}

impl<A, E> Clone for Fiber<A, E> {
    fn clone(&self) -> Self {
        Fiber {
            state: self.state.clone(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<A, E> Fiber<A, E> {
    pub(crate) fn new_handle() -> (Self, Arc<FiberState<E>>) {
        let state = Arc::new(FiberState::new());
        (
            Fiber {
                state: state.clone(),
                _marker: std::marker::PhantomData,
            },
            state,
        )
    }

    pub(crate) fn from_raw(state: Arc<FiberState<E>>) -> Self {
        Fiber {
            state,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.done.load(Ordering::SeqCst)
    }

    /// Request interruption. Cooperative: the fiber notices at its next
    /// suspension point, not instantaneously (§5).
    pub fn interrupt(&self) {
        self.state.interrupt.trigger(InterruptReason::Cancelled);
    }

    pub(crate) fn interrupt_flag(&self) -> InterruptFlag {
        self.state.interrupt.clone()
    }

    /// Await this fiber's result without consuming the handle: fibers are
    /// commonly joined from more than one place (e.g. `par_all`'s aggregator
    /// and a user's own call both inspect the same outcome).
    pub fn join(&self) -> FiberJoin<A, E> {
        FiberJoin {
            state: self.state.clone(),
            _marker: std::marker::PhantomData,
        }
    }
}

pub struct FiberJoin<A, E> {
    state: Arc<FiberState<E>>,
    _marker: std::marker::PhantomData<fn() -> A>,
}

impl<A, E> std::future::Future for FiberJoin<A, E>
where
    A: Clone + 'static,
    E: Clone,
{
    type Output = Result<A, FiberFailure<E>>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        if let Some(ready) = Self::extract(&self.state) {
            return std::task::Poll::Ready(ready);
        }
        self.state.register_waker(cx.waker());
        // Completion may have raced between the first read and registering
        // the waker; check once more before committing to `Pending`.
        if let Some(ready) = Self::extract(&self.state) {
            return std::task::Poll::Ready(ready);
        }
        std::task::Poll::Pending
    }
}

impl<A, E> FiberJoin<A, E>
where
    A: Clone + 'static,
    E: Clone,
{
    fn extract(state: &Arc<FiberState<E>>) -> Option<Result<A, FiberFailure<E>>> {
        let guard = state.result.lock().unwrap();
        match &*guard {
            Some(Ok(boxed)) => Some(Ok(boxed
                .downcast_ref::<A>()
                .expect("effectual: internal type-erasure invariant violated")
                .clone())),
            Some(Err(failure)) => Some(Err(failure.clone())),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        effect::Effect,
        runtime::Runtime,
        strategy::SynchronousStrategy,
    };

    #[test]
    fn finalizers_run_in_reverse_registration_order() {
        let order: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let order_check = order.clone();
        let rt = Runtime::new(SynchronousStrategy::new());
        let program: Effect<(), String> = Effect::scoped(move |scope: Scope<String>| {
            for i in 0..3 {
                let order = order.clone();
                let _ = scope.add(Arc::new(move || {
                    order.lock().unwrap().push(i);
                    Arc::new(Node::Succeed(Arc::new(|| Box::new(()) as crate::effect::node::AnyBox)))
                }));
            }
            Effect::succeed(())
        });
        rt.run_safely(program).unwrap();
        assert_eq!(*order_check.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn late_registration_after_close_is_rejected() {
        let scope: Scope<String> = Scope::new();
        let _ = scope.close();
        assert!(scope.is_closed());
        let result = scope.add(Arc::new(|| Arc::new(Node::RunFinalizers(Vec::new()))));
        assert!(result.is_err());
    }

    #[test]
    fn interrupting_a_fiber_sets_its_flag_without_stopping_it_synchronously() {
        let (fiber, state): (Fiber<(), String>, _) = Fiber::new_handle();
        assert!(!fiber.is_done());
        fiber.interrupt();
        assert_eq!(state.interrupt.get(), Some(InterruptReason::Cancelled));
        assert!(!fiber.is_done());
    }
}

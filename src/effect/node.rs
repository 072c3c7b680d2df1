//! The type-erased internal representation of an `Effect` tree.
//!
//! `Effect<A, E>` (in `effect::mod`) is a thin, statically-typed handle
//! around a `Node<E>`. Success values are erased to `AnyBox` inside `Node`
//! because a single chain mixes many different `A` types across `FlatMap`
//! boundaries; `Effect<A, E>` recovers the static type with a single
//! downcast at the edges (see `crate::interpreter`).
//!
//! Every closure carried by a `Node` is `Fn`, not `FnOnce`: `Retry` (and, more
//! generally, running the same built `Effect` value more than once) needs to
//! re-enter the whole tree from the top, so no node may assume it is only
//! ever invoked a single time. This is the Rust-specific adaptation of
//! §9's "cyclic closures for recursion" note — see `DESIGN.md`.

use std::{
    any::Any,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        Mutex,
    },
};

use crate::{
    cause::Cause,
    context::{
        Context,
        ServiceNotFound,
    },
    duration::Duration,
    schedule::Schedule,
    scope::{
        FiberState,
        Scope,
    },
};

// `+ Sync` (not just `+ Send`) because the erased success value backs an
// `Effect<A, E>` whose own combinators require `A: Send + Sync + 'static` —
// a box that could only promise `Send` would make `Vec<AnyBox>`/`Result<AnyBox, _>`
// (as produced by `all_par`'s and `JoinSet`'s erasure boundaries) fail that
// bound, since `Sync` for a container isn't implied by its elements being
// merely `Send`.
pub(crate) type AnyBox = Box<dyn Any + Send + Sync>;

pub(crate) type SuccessThunk = Arc<dyn Fn() -> AnyBox + Send + Sync>;
pub(crate) type SyncThunk<E> = Arc<dyn Fn() -> Result<AnyBox, Cause<E>> + Send + Sync>;
pub(crate) type SuspendThunk<E> = Arc<dyn Fn() -> Arc<Node<E>> + Send + Sync>;
pub(crate) type MapFn = Arc<dyn Fn(AnyBox) -> AnyBox + Send + Sync>;
pub(crate) type FlatMapFn<E> = Arc<dyn Fn(AnyBox) -> Arc<Node<E>> + Send + Sync>;
pub(crate) type CauseMatcher<E> = Arc<dyn Fn(&Cause<E>) -> bool + Send + Sync>;
pub(crate) type CatchHandler<E> = Arc<dyn Fn(Cause<E>) -> Arc<Node<E>> + Send + Sync>;
pub(crate) type FinalizerThunk<E> = Arc<dyn Fn() -> Arc<Node<E>> + Send + Sync>;
pub(crate) type ServiceLookup<E> = Arc<dyn Fn(&Context) -> Result<AnyBox, ServiceNotFound> + Send + Sync>;
pub(crate) type ScopedThunk<E> = Arc<dyn Fn(Scope<E>) -> Arc<Node<E>> + Send + Sync>;
pub(crate) type AsyncRegistrar<E> = Arc<dyn Fn(RawCompletion<E>) + Send + Sync>;

/// The immutable, type-erased program description. See §3.1.
pub(crate) enum Node<E> {
    Succeed(SuccessThunk),
    Fail(Cause<E>),
    Sync(SyncThunk<E>),
    Suspend(SuspendThunk<E>),
    Map(Arc<Node<E>>, MapFn),
    FlatMap(Arc<Node<E>>, FlatMapFn<E>),
    Catch(Arc<Node<E>>, CauseMatcher<E>, CatchHandler<E>),
    Ensuring(Arc<Node<E>>, FinalizerThunk<E>),
    Timeout(Arc<Node<E>>, Duration),
    Retry(Arc<Node<E>>, Schedule),
    Provide(Arc<Node<E>>, Context),
    Service(ServiceLookup<E>, &'static str),
    Sleep(Duration),
    Fork(Arc<Node<E>>),
    Async(AsyncRegistrar<E>),
    Scoped(ScopedThunk<E>),
    ParAll(Vec<Arc<Node<E>>>),
    Race(Vec<Arc<Node<E>>>),
    /// Interpreter-internal only: run every finalizer regardless of whether
    /// earlier ones failed, joining all failures `Sequential`. Built by
    /// `Scope::close` (§3.5) rather than constructed through the public
    /// `Effect` API.
    RunFinalizers(Vec<FinalizerThunk<E>>),
    /// Interpreter-internal only: await an already-running fiber, producing
    /// `Ok`/`Err(FiberFailure)` as a plain value rather than a `Cause` (a
    /// joined fiber's failure is data, not this effect's own failure). Built
    /// by `crate::join::JoinSet`, which needs to fold `fork` + `await` into
    /// a single `Effect` the same way `ParAll`/`Race` do internally.
    Join(Arc<FiberState<E>>),
}

struct CompletionInner<E> {
    used: AtomicBool,
    sender: Mutex<Option<Box<dyn FnOnce(Result<AnyBox, Cause<E>>) + Send>>>,
}

/// The type-erased completion handle threaded through `Node::Async`'s
/// registrar. Resuming more than once is a programming error: §9
/// mandates this be detectable in debug builds, so a second call panics in
/// debug and is logged-and-ignored in release.
#[derive(Clone)]
pub(crate) struct RawCompletion<E> {
    inner: Arc<CompletionInner<E>>,
}

impl<E> RawCompletion<E> {
    pub(crate) fn new(on_complete: impl FnOnce(Result<AnyBox, Cause<E>>) + Send + 'static) -> Self {
        RawCompletion {
            inner: Arc::new(CompletionInner {
                used: AtomicBool::new(false),
                sender: Mutex::new(Some(Box::new(on_complete))),
            }),
        }
    }

    pub(crate) fn complete(&self, result: Result<AnyBox, Cause<E>>) {
        let already_used = self.inner.used.swap(true, Ordering::SeqCst);
        if already_used {
            if cfg!(debug_assertions) {
                panic!("Async completion function invoked more than once");
            } else {
                tracing::error!("Async completion function invoked more than once; ignoring");
                return;
            }
        }
        let sender = self.inner.sender.lock().unwrap().take();
        if let Some(on_complete) = sender {
            on_complete(result);
        }
    }
}

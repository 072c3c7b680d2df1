//! The cooperative strategy: one OS thread, many interleaved tasks. In the
//! style of `runtime::testing::future_set::FutureSet` — a fairness-bounded,
//! wake-set-driven single-threaded executor — plus the `ThreadNotify`
//! park/unpark pattern from `runtime::testing::runtime` that lets `block_on`
//! sleep the calling thread between timeslices instead of spinning. New
//! tasks arrive over a channel (not a shared lock on the `FutureSet` itself),
//! mirroring an `incoming_tx`/`incoming_rx` pair: a child fiber's own poll
//! can itself fork further children, and a `Mutex<FutureSet>` locked for the
//! duration of a nested poll would deadlock on re-entry.

use std::{
    collections::{
        BTreeMap,
        BTreeSet,
    },
    future::Future,
    mem,
    pin::Pin,
    sync::Arc,
    task::{
        Context as TaskContext,
        Poll,
        Wake,
        Waker,
    },
};

use futures::future::BoxFuture;
use parking_lot::{
    Condvar,
    Mutex,
};

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

struct FutureSetWaker {
    id: usize,
    wake_set: Arc<Mutex<BTreeSet<usize>>>,
    parent: Waker,
}

impl Wake for FutureSetWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref()
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.wake_set.lock().insert(self.id);
        self.parent.wake_by_ref();
    }
}

/// A single-threaded pool of spawned tasks, polled fairly: one pass over
/// whatever was marked ready at the start of the pass, not a drain-to-
/// quiescence loop (an adversarial or mutually-waking pair of tasks could
/// otherwise starve the driver forever).
struct FutureSet {
    next_id: usize,
    futures: BTreeMap<usize, Pin<Box<dyn Future<Output = ()> + Send + 'static>>>,
    wake_set: Arc<Mutex<BTreeSet<usize>>>,
}

impl FutureSet {
    fn new() -> Self {
        FutureSet {
            next_id: 0,
            futures: BTreeMap::new(),
            wake_set: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    fn insert(&mut self, f: BoxFuture<'static, ()>) {
        let id = self.next_id;
        self.next_id += 1;
        self.futures.insert(id, f);
        self.wake_set.lock().insert(id);
    }

    /// Poll every task marked ready since the last pass. Returns whether any
    /// task actually ran, so the driver can tell real progress from a
    /// spurious wakeup.
    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> bool {
        let ready = {
            let mut wake_set = self.wake_set.lock();
            mem::take(&mut *wake_set)
        };
        let made_progress = !ready.is_empty();
        for id in ready {
            let future = match self.futures.get_mut(&id) {
                Some(f) => f,
                None => continue,
            };
            let fsw = FutureSetWaker {
                id,
                wake_set: self.wake_set.clone(),
                parent: cx.waker().clone(),
            };
            let waker = Waker::from(Arc::new(fsw));
            let mut inner_cx = TaskContext::from_waker(&waker);
            if future.as_mut().poll(&mut inner_cx).is_ready() {
                self.futures.remove(&id);
            }
        }
        made_progress
    }
}

/// Parked-thread notification, woken by any task's waker firing. Lets
/// `block_on` sleep between timeslices instead of busy-polling.
struct ThreadNotify {
    cv: Condvar,
    unparked: Mutex<bool>,
}

impl Wake for ThreadNotify {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref()
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let mut unparked = self.unparked.lock();
        *unparked = true;
        self.cv.notify_all();
    }
}

impl ThreadNotify {
    fn new() -> Arc<Self> {
        Arc::new(ThreadNotify {
            cv: Condvar::new(),
            unparked: Mutex::new(false),
        })
    }

    fn take_notification(self: &Arc<Self>) -> bool {
        let mut unparked = self.unparked.lock();
        let ret = *unparked;
        *unparked = false;
        ret
    }

    fn wait(self: &Arc<Self>) {
        let mut unparked = self.unparked.lock();
        while !*unparked {
            self.cv.wait(&mut unparked);
        }
        *unparked = false;
    }
}

pub(crate) struct CooperativeSpawn {
    tx: crossbeam_channel::Sender<BoxFuture<'static, ()>>,
}

impl RawSpawn for CooperativeSpawn {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        // The receiving end outlives every spawner for the lifetime of one
        // `block_on` call; a send error here would mean the driver itself
        // has already been torn down, which shouldn't be reachable.
        let _ = self.tx.send(fut);
    }
}

/// Owns the actual task pool and the receiving half of the spawn channel.
/// Not `Clone`: there is exactly one per `CooperativeStrategy`/
/// `TestExecutionStrategy`, driven by whichever thread calls `block_on`.
pub(crate) struct Driver {
    futures: FutureSet,
    rx: crossbeam_channel::Receiver<BoxFuture<'static, ()>>,
}

impl Driver {
    fn drain_incoming(&mut self) {
        while let Ok(fut) = self.rx.try_recv() {
            self.futures.insert(fut);
        }
    }

    fn poll_once(&mut self, cx: &mut TaskContext<'_>) -> bool {
        self.drain_incoming();
        self.futures.poll_ready(cx)
    }
}

pub(crate) fn new_spawn_pair() -> (Arc<CooperativeSpawn>, Mutex<Driver>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let spawn = Arc::new(CooperativeSpawn { tx });
    let driver = Mutex::new(Driver {
        futures: FutureSet::new(),
        rx,
    });
    (spawn, driver)
}

/// Drive `main` to completion, interleaving it with whatever gets spawned
/// onto `driver` along the way. `on_stall` runs whenever neither `main` nor
/// the task pool made progress on a pass; it returns whether the caller
/// should retry immediately (e.g. after advancing a virtual clock) rather
/// than park the thread. Shared by `CooperativeStrategy` and
/// `TestExecutionStrategy`.
pub(crate) fn drive<F: Future>(main: F, driver: &mut Driver, mut on_stall: impl FnMut() -> bool) -> F::Output {
    futures::pin_mut!(main);
    let notify = ThreadNotify::new();
    let waker = Waker::from(notify.clone());
    let mut cx = TaskContext::from_waker(&waker);
    loop {
        if let Poll::Ready(out) = main.as_mut().poll(&mut cx) {
            return out;
        }
        let progressed = driver.poll_once(&mut cx);
        if progressed || notify.take_notification() {
            continue;
        }
        if on_stall() {
            continue;
        }
        notify.wait();
    }
}

/// One OS thread, cooperative interleaving, real time. Matches §4.3's
/// "each fiber is a cooperative task... only one task runs at a time".
pub struct CooperativeStrategy {
    driver: Mutex<Driver>,
    env: Environment,
}

impl CooperativeStrategy {
    pub fn new() -> Self {
        let (spawn, driver) = new_spawn_pair();
        let env = Environment {
            clock: Arc::new(SystemClock::new()),
            spawner: spawn,
            rng: super::seeded_rng(rand::random()),
        };
        CooperativeStrategy { driver, env }
    }
}

impl Default for CooperativeStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for CooperativeStrategy {
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
        drive(interp, &mut driver, || false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        effect::Effect,
        runtime::Runtime,
        scope::Scope,
    };

    #[test]
    fn forked_fiber_can_be_joined_through_a_join_set() {
        let rt = Runtime::new(CooperativeStrategy::new());
        let program: Effect<i32, String> = Effect::scoped(|scope: Scope<String>| {
            let set = scope.join_set::<i32>();
            set.spawn(Effect::succeed(21).map(|n| n * 2)).flat_map(move |_fiber| {
                set.join_next().map(|result| match result {
                    Some(Ok(value)) => value,
                    other => panic!("expected a completed join, got {other:?}"),
                })
            })
        });
        assert_eq!(rt.run_safely(program).unwrap(), 42);
    }

    #[test]
    fn a_forked_child_can_itself_fork_a_grandchild_without_deadlocking() {
        let rt = Runtime::new(CooperativeStrategy::new());
        let program: Effect<i32, String> = Effect::scoped(|scope: Scope<String>| {
            let outer_set = scope.join_set::<i32>();
            let inner_set = outer_set.clone();
            outer_set
                .spawn(Effect::scoped(move |inner_scope: Scope<String>| {
                    let set = inner_scope.join_set::<i32>();
                    set.spawn(Effect::succeed(1).map(|n| n + 1)).flat_map(move |_fiber| {
                        set.join_next().map(|result| match result {
                            Some(Ok(value)) => value,
                            other => panic!("expected a completed join, got {other:?}"),
                        })
                    })
                }))
                .flat_map(move |_fiber| {
                    inner_set.join_next().map(|result| match result {
                        Some(Ok(value)) => value,
                        other => panic!("expected a completed join, got {other:?}"),
                    })
                })
        });
        assert_eq!(rt.run_safely(program).unwrap(), 2);
    }
}

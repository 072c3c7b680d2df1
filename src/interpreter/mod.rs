//! The stack-safe trampoline that turns a `Node<E>` tree into a polled
//! `Future`. See §4.2: "a long `flatMap` chain reduces iteratively
//! against an explicit continuation stack, never via native recursion."
//!
//! `Interpreter<E>` is itself a `Future`; a `Strategy` drives it the same way
//! it drives any other future (blocking, cooperative polling, or virtual-time
//! stepping — see `crate::strategy`). Forking, racing, and running things in
//! parallel spawn further `Interpreter`s onto the strategy's executor and
//! join their type-erased completion state (`crate::scope::FiberState`).

use std::{
    future::Future,
    panic::AssertUnwindSafe,
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

use futures::future::BoxFuture;
use rand::rngs::StdRng;

use crate::{
    cause::Cause,
    clock::DynClock,
    context::Context,
    duration::Duration,
    effect::node::{
        AnyBox,
        FinalizerThunk,
        Node,
        RawCompletion,
    },
    schedule::{
        Decision,
        Schedule,
    },
    scope::{
        FiberFailure,
        FiberState,
        InterruptFlag,
        InterruptReason,
        Scope,
    },
};

/// Everything the interpreter needs from the outside world that isn't
/// carried in the `Node` tree itself: the clock effects read through
/// `Sleep`/`Effect::sleep`, the executor `Fork`/`ParAll`/`Race` spawn onto,
/// and a source of randomness for jittered schedules. Cheap to clone: every
/// field is `Arc`-backed.
#[derive(Clone)]
pub(crate) struct Environment {
    pub(crate) clock: DynClock,
    pub(crate) spawner: DynSpawn,
    pub(crate) rng: Arc<Mutex<StdRng>>,
}

/// Hands a boxed future to whatever executor the active strategy runs on.
/// Implemented once per strategy (`crate::strategy::cooperative`'s
/// `FutureSet`, or a thread-per-fiber shim for the synchronous strategy).
pub(crate) trait RawSpawn: Send + Sync {
    fn spawn(&self, fut: BoxFuture<'static, ()>);
}

pub(crate) type DynSpawn = Arc<dyn RawSpawn>;

type Outcome<E> = Result<AnyBox, Cause<E>>;

enum RunState<E> {
    Running(Arc<Node<E>>),
    Producing(AnyBox),
    Throwing(Cause<E>),
}

enum Frame<E> {
    Map(crate::effect::node::MapFn),
    FlatMap(crate::effect::node::FlatMapFn<E>),
    Catch(crate::effect::node::CauseMatcher<E>, crate::effect::node::CatchHandler<E>),
    Ensuring(FinalizerThunk<E>),
    AfterFinalizer(Outcome<E>),
    RestoreContext(Context),
    Retry(Arc<Node<E>>, Schedule, u32, i64),
    FinalizersSeq(Vec<FinalizerThunk<E>>, Vec<Cause<E>>),
}

enum Step<E> {
    Continue(RunState<E>),
    Suspend(BoxFuture<'static, Outcome<E>>),
}

/// Drives a single `Node<E>` tree to completion. One `Interpreter` backs one
/// fiber: the top-level one `Runtime::run` builds, or any child spawned by
/// `Fork`/`ParAll`/`Race`.
pub(crate) struct Interpreter<E> {
    state: Option<RunState<E>>,
    frames: Vec<Frame<E>>,
    context: Context,
    env: Environment,
    interrupt: InterruptFlag,
    in_finalizer_depth: u32,
    pending: Option<BoxFuture<'static, Outcome<E>>>,
}

impl<E> Interpreter<E>
where
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(node: Arc<Node<E>>, context: Context, env: Environment, interrupt: InterruptFlag) -> Self {
        Interpreter {
            state: Some(RunState::Running(node)),
            frames: Vec::new(),
            context,
            env,
            interrupt,
            in_finalizer_depth: 0,
            pending: None,
        }
    }

    fn dispatch(&mut self, node: Arc<Node<E>>) -> Step<E> {
        match &*node {
            Node::Succeed(f) => Step::Continue(RunState::Producing(f())),
            Node::Fail(cause) => Step::Continue(RunState::Throwing(cause.clone())),
            Node::Sync(f) => Step::Continue(match f() {
                Ok(v) => RunState::Producing(v),
                Err(c) => RunState::Throwing(c),
            }),
            Node::Suspend(f) => Step::Continue(RunState::Running(f())),
            Node::Map(src, map_fn) => {
                self.frames.push(Frame::Map(map_fn.clone()));
                Step::Continue(RunState::Running(src.clone()))
            },
            Node::FlatMap(src, flat_fn) => {
                self.frames.push(Frame::FlatMap(flat_fn.clone()));
                Step::Continue(RunState::Running(src.clone()))
            },
            Node::Catch(src, matcher, handler) => {
                self.frames.push(Frame::Catch(matcher.clone(), handler.clone()));
                Step::Continue(RunState::Running(src.clone()))
            },
            Node::Ensuring(src, finalizer) => {
                self.frames.push(Frame::Ensuring(finalizer.clone()));
                Step::Continue(RunState::Running(src.clone()))
            },
            Node::Timeout(src, duration) => {
                let timeout_branch: Arc<Node<E>> = Arc::new(Node::FlatMap(
                    Arc::new(Node::Sleep(*duration)),
                    Arc::new(|_unit: AnyBox| Arc::new(Node::Fail(Cause::timeout())) as Arc<Node<E>>),
                ));
                Step::Continue(RunState::Running(Arc::new(Node::Race(vec![src.clone(), timeout_branch]))))
            },
            Node::Retry(src, schedule) => {
                let started_at = self.env.clock.current_time_millis();
                self.frames.push(Frame::Retry(src.clone(), schedule.clone(), 0, started_at));
                Step::Continue(RunState::Running(src.clone()))
            },
            Node::Provide(src, new_context) => {
                self.frames.push(Frame::RestoreContext(self.context.clone()));
                self.context = self.context.merge(new_context);
                Step::Continue(RunState::Running(src.clone()))
            },
            Node::Service(lookup, _name) => match lookup(&self.context) {
                Ok(v) => Step::Continue(RunState::Producing(v)),
                // A missing service binding is a wiring defect, not a typed
                // domain failure: there is no `E` value to manufacture one
                // from, so it's reported as a `Cause::Die` rather than a
                // `Cause::Fail(E)` — still a recoverable `Throwing`, not a
                // panic.
                Err(not_found) => Step::Continue(RunState::Throwing(Cause::die(not_found))),
            },
            Node::Sleep(duration) => {
                let clock = self.env.clock.clone();
                let duration = *duration;
                Step::Suspend(Box::pin(async move {
                    clock.sleep(duration).await;
                    Ok(Box::new(()) as AnyBox)
                }))
            },
            Node::Fork(src) => {
                let state = spawn_child(src.clone(), self.context.clone(), self.env.clone());
                Step::Continue(RunState::Producing(Box::new(state) as AnyBox))
            },
            Node::Async(registrar) => {
                let (tx, rx) = futures::channel::oneshot::channel::<Outcome<E>>();
                let tx = Mutex::new(Some(tx));
                let raw = RawCompletion::new(move |result| {
                    if let Some(tx) = tx.lock().unwrap().take() {
                        let _ = tx.send(result);
                    }
                });
                registrar(raw);
                Step::Suspend(Box::pin(async move { rx.await.unwrap_or_else(|_| Err(Cause::interrupt())) }))
            },
            Node::Scoped(body) => {
                let scope = Scope::new();
                let body_node = body(scope.clone());
                let closer: FinalizerThunk<E> = Arc::new(move || scope.close());
                self.frames.push(Frame::Ensuring(closer));
                Step::Continue(RunState::Running(body_node))
            },
            Node::ParAll(children) => {
                let states: Vec<_> = children
                    .iter()
                    .map(|c| spawn_child(c.clone(), self.context.clone(), self.env.clone()))
                    .collect();
                let len = states.len();
                Step::Suspend(Box::pin(ParAllJoin {
                    states,
                    results: vec![None; len],
                }))
            },
            Node::Race(children) => {
                let states: Vec<_> = children
                    .iter()
                    .map(|c| spawn_child(c.clone(), self.context.clone(), self.env.clone()))
                    .collect();
                Step::Suspend(Box::pin(RaceJoin::new(states)))
            },
            Node::RunFinalizers(finalizers) => {
                self.in_finalizer_depth += 1;
                self.run_finalizers_seq(finalizers.clone())
            },
            Node::Join(state) => {
                let state = state.clone();
                Step::Suspend(Box::pin(async move {
                    match std::future::poll_fn(|cx| state.poll_take(cx)).await {
                        Ok(v) => Ok(Box::new(Ok::<AnyBox, FiberFailure<E>>(v)) as AnyBox),
                        Err(failure) => Ok(Box::new(Err::<AnyBox, FiberFailure<E>>(failure)) as AnyBox),
                    }
                }))
            },
        }
    }

    fn run_finalizers_seq(&mut self, mut remaining: Vec<FinalizerThunk<E>>) -> Step<E> {
        if remaining.is_empty() {
            self.in_finalizer_depth -= 1;
            return Step::Continue(RunState::Producing(Box::new(()) as AnyBox));
        }
        let first = remaining.remove(0);
        self.frames.push(Frame::FinalizersSeq(remaining, Vec::new()));
        Step::Continue(RunState::Running(first()))
    }

    fn apply_finalizers_seq(
        &mut self,
        remaining: Vec<FinalizerThunk<E>>,
        mut collected: Vec<Cause<E>>,
        outcome: Outcome<E>,
    ) -> Step<E> {
        if let Err(c) = outcome {
            collected.push(c);
        }
        if remaining.is_empty() {
            self.in_finalizer_depth -= 1;
            return Step::Continue(if collected.is_empty() {
                RunState::Producing(Box::new(()) as AnyBox)
            } else {
                RunState::Throwing(Cause::sequential(collected))
            });
        }
        let mut remaining = remaining;
        let next = remaining.remove(0);
        self.frames.push(Frame::FinalizersSeq(remaining, collected));
        Step::Continue(RunState::Running(next()))
    }

    fn apply_ensuring(&mut self, finalizer: FinalizerThunk<E>, outcome: Outcome<E>) -> Step<E> {
        self.in_finalizer_depth += 1;
        self.frames.push(Frame::AfterFinalizer(outcome));
        Step::Continue(RunState::Running(finalizer()))
    }

    fn apply_after_finalizer(&mut self, prior: Outcome<E>, finalizer_outcome: Outcome<E>) -> Step<E> {
        self.in_finalizer_depth -= 1;
        let combined = match (prior, finalizer_outcome) {
            (Ok(v), Ok(_)) => Ok(v),
            (Ok(_), Err(fc)) => Err(fc),
            (Err(c), Ok(_)) => Err(c),
            (Err(c), Err(fc)) => Err(c.then(fc)),
        };
        Step::Continue(match combined {
            Ok(v) => RunState::Producing(v),
            Err(c) => RunState::Throwing(c),
        })
    }

    fn apply_retry(&mut self, src: Arc<Node<E>>, schedule: Schedule, attempt: u32, started_at: i64, cause: Cause<E>) -> Step<E> {
        if cause.is_interrupt() {
            return Step::Continue(RunState::Throwing(cause));
        }
        let elapsed = Duration::from_millis(self.env.clock.current_time_millis() - started_at);
        let decision = {
            let mut rng = self.env.rng.lock().unwrap();
            schedule.step(attempt, elapsed, &mut *rng)
        };
        match decision {
            Decision::Stop => Step::Continue(RunState::Throwing(cause)),
            Decision::Continue(delay) => {
                crate::metrics::log_schedule_retry();
                let resume_src = src.clone();
                let resume: Arc<Node<E>> = Arc::new(Node::FlatMap(
                    Arc::new(Node::Sleep(delay)),
                    Arc::new(move |_unit: AnyBox| resume_src.clone()),
                ));
                self.frames.push(Frame::Retry(src, schedule, attempt + 1, started_at));
                Step::Continue(RunState::Running(resume))
            },
        }
    }

    fn apply_success_frame(&mut self, frame: Frame<E>, value: AnyBox) -> Step<E> {
        match frame {
            Frame::Map(f) => Step::Continue(RunState::Producing(f(value))),
            Frame::FlatMap(f) => Step::Continue(RunState::Running(f(value))),
            Frame::Catch(..) => Step::Continue(RunState::Producing(value)),
            Frame::Ensuring(finalizer) => self.apply_ensuring(finalizer, Ok(value)),
            Frame::AfterFinalizer(prior) => self.apply_after_finalizer(prior, Ok(value)),
            Frame::RestoreContext(ctx) => {
                self.context = ctx;
                Step::Continue(RunState::Producing(value))
            },
            Frame::Retry(..) => Step::Continue(RunState::Producing(value)),
            Frame::FinalizersSeq(remaining, collected) => self.apply_finalizers_seq(remaining, collected, Ok(value)),
        }
    }

    fn apply_failure_frame(&mut self, frame: Frame<E>, cause: Cause<E>) -> Step<E> {
        match frame {
            Frame::Map(_) | Frame::FlatMap(_) => Step::Continue(RunState::Throwing(cause)),
            Frame::Catch(matcher, handler) => {
                if matcher(&cause) {
                    Step::Continue(RunState::Running(handler(cause)))
                } else {
                    Step::Continue(RunState::Throwing(cause))
                }
            },
            Frame::Ensuring(finalizer) => self.apply_ensuring(finalizer, Err(cause)),
            Frame::AfterFinalizer(prior) => self.apply_after_finalizer(prior, Err(cause)),
            Frame::RestoreContext(ctx) => {
                self.context = ctx;
                Step::Continue(RunState::Throwing(cause))
            },
            Frame::Retry(src, schedule, attempt, started_at) => self.apply_retry(src, schedule, attempt, started_at, cause),
            Frame::FinalizersSeq(remaining, collected) => self.apply_finalizers_seq(remaining, collected, Err(cause)),
        }
    }
}

impl<E> Future for Interpreter<E>
where
    E: Clone + Send + Sync + 'static,
{
    type Output = Outcome<E>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            if let Some(fut) = this.pending.as_mut() {
                match fut.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(result) => {
                        this.pending = None;
                        this.state = Some(match result {
                            Ok(v) => RunState::Producing(v),
                            Err(c) => RunState::Throwing(c),
                        });
                    },
                }
                continue;
            }

            match this.state.take().expect("Interpreter polled after completion") {
                RunState::Running(node) => {
                    if this.in_finalizer_depth == 0 {
                        if let Some(reason) = this.interrupt.get() {
                            this.state = Some(RunState::Throwing(Cause::Interrupt(reason.into())));
                            continue;
                        }
                    }
                    match this.dispatch(node) {
                        Step::Continue(next) => this.state = Some(next),
                        Step::Suspend(fut) => {
                            this.pending = Some(fut);
                            // Placeholder, immediately overwritten once
                            // `pending` resolves; never observed otherwise.
                            this.state = Some(RunState::Producing(Box::new(()) as AnyBox));
                        },
                    }
                },
                RunState::Producing(value) => match this.frames.pop() {
                    None => return Poll::Ready(Ok(value)),
                    Some(frame) => match this.apply_success_frame(frame, value) {
                        Step::Continue(next) => this.state = Some(next),
                        Step::Suspend(fut) => {
                            this.pending = Some(fut);
                            this.state = Some(RunState::Producing(Box::new(()) as AnyBox));
                        },
                    },
                },
                RunState::Throwing(cause) => match this.frames.pop() {
                    None => return Poll::Ready(Err(cause)),
                    Some(frame) => match this.apply_failure_frame(frame, cause) {
                        Step::Continue(next) => this.state = Some(next),
                        Step::Suspend(fut) => {
                            this.pending = Some(fut);
                            this.state = Some(RunState::Producing(Box::new(()) as AnyBox));
                        },
                    },
                },
            }
        }
    }
}

/// Spawn `node` as an independent fiber on the active executor, returning its
/// type-erased completion state. Used by `Node::Fork` directly, and by
/// `ParAll`/`Race` to run their children.
fn spawn_child<E>(node: Arc<Node<E>>, context: Context, env: Environment) -> Arc<FiberState<E>>
where
    E: Clone + Send + Sync + 'static,
{
    let state = Arc::new(FiberState::new());
    let interrupt = state.interrupt.clone();
    let for_task = state.clone();
    let child = Interpreter::new(node, context, env.clone(), interrupt);
    let guarded = PanicGuarded { inner: child };
    crate::metrics::log_fiber_spawned();
    let task = async move {
        let result = guarded.await;
        match &result {
            Ok(_) => crate::metrics::log_fiber_completed(),
            Err(FiberFailure::Cause(cause)) if cause.is_interrupt() => crate::metrics::log_fiber_interrupted(),
            Err(_) => crate::metrics::log_fiber_failed(),
        }
        for_task.complete(result);
    };
    env.spawner.spawn(Box::pin(task));
    state
}

/// Wraps a fiber-level future so a panic inside user code (a `sync`/`map`
/// closure) is caught at this fork boundary and reported as
/// `FiberFailure::Panicked`, rather than unwinding through the executor.
/// Applied both to forked children (here, via `spawn_child`) and to the
/// top-level interpreter each `Strategy::block_on` drives
/// (`crate::strategy::new_interpreter`), so a panicking thunk is reported
/// the same way regardless of whether it ran inside a `fork` or at the root.
pub(crate) struct PanicGuarded<F> {
    pub(crate) inner: F,
}

impl<F, E> Future for PanicGuarded<F>
where
    F: Future<Output = Outcome<E>> + Unpin,
{
    type Output = Result<AnyBox, FiberFailure<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let polled = std::panic::catch_unwind(AssertUnwindSafe(|| Pin::new(&mut this.inner).poll(cx)));
        match polled {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(Ok(v))) => Poll::Ready(Ok(v)),
            Ok(Poll::Ready(Err(c))) => Poll::Ready(Err(FiberFailure::Cause(c))),
            Err(payload) => Poll::Ready(Err(FiberFailure::Panicked(Arc::new(panic_to_anyhow(payload))))),
        }
    }
}

fn panic_to_anyhow(payload: Box<dyn std::any::Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "fiber panicked with a non-string payload".to_string());
    anyhow::anyhow!(message)
}

/// Aggregates `Node::ParAll`'s children: waits for every sibling, collecting
/// results in input order, but fails fast (interrupting remaining siblings)
/// on the first typed failure or panic.
struct ParAllJoin<E> {
    states: Vec<Arc<FiberState<E>>>,
    results: Vec<Option<AnyBox>>,
}

impl<E> Future for ParAllJoin<E> {
    type Output = Outcome<E>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut any_pending = false;
        for (i, state) in this.states.iter().enumerate() {
            if this.results[i].is_some() {
                continue;
            }
            match state.poll_take(cx) {
                Poll::Pending => any_pending = true,
                Poll::Ready(Ok(v)) => this.results[i] = Some(v),
                Poll::Ready(Err(FiberFailure::Panicked(payload))) => {
                    interrupt_all(&this.states);
                    std::panic::resume_unwind(Box::new(payload));
                },
                Poll::Ready(Err(FiberFailure::Cause(cause))) => {
                    interrupt_all(&this.states);
                    return Poll::Ready(Err(cause));
                },
            }
        }
        if any_pending {
            return Poll::Pending;
        }
        let values: Vec<AnyBox> = this.results.iter_mut().map(|slot| slot.take().unwrap()).collect();
        Poll::Ready(Ok(Box::new(values) as AnyBox))
    }
}

/// Aggregates `Node::Race`'s children: the first to *succeed* decides the
/// outcome immediately, interrupting every other sibling. A failing sibling
/// does not conclude the race on its own — the remaining siblings are still
/// given a chance to win — so `Race` only fails once every sibling has
/// failed, with a `Parallel` of all their causes.
struct RaceJoin<E> {
    states: Vec<Arc<FiberState<E>>>,
    failures: Vec<Option<Cause<E>>>,
}

impl<E> RaceJoin<E> {
    fn new(states: Vec<Arc<FiberState<E>>>) -> Self {
        let failures = vec![None; states.len()];
        RaceJoin { states, failures }
    }
}

impl<E> Future for RaceJoin<E> {
    type Output = Outcome<E>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        for (i, state) in this.states.iter().enumerate() {
            if this.failures[i].is_some() {
                continue;
            }
            match state.poll_take(cx) {
                Poll::Ready(Ok(v)) => {
                    interrupt_all(&this.states);
                    return Poll::Ready(Ok(v));
                },
                Poll::Ready(Err(FiberFailure::Panicked(payload))) => {
                    interrupt_all(&this.states);
                    std::panic::resume_unwind(Box::new(payload));
                },
                Poll::Ready(Err(FiberFailure::Cause(cause))) => {
                    this.failures[i] = Some(cause);
                },
                Poll::Pending => {},
            }
        }
        if this.failures.iter().all(Option::is_some) {
            let causes = this.failures.iter_mut().map(|c| c.take().unwrap()).collect();
            return Poll::Ready(Err(Cause::parallel(causes)));
        }
        Poll::Pending
    }
}

fn interrupt_all<E>(states: &[Arc<FiberState<E>>]) {
    for state in states {
        state.interrupt.trigger(InterruptReason::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        effect::Effect,
        runtime::Runtime,
        strategy::{
            CooperativeStrategy,
            SynchronousStrategy,
        },
    };

    /// A chain deep enough that native recursion through `.then()` would blow
    /// the stack; the trampoline reduces it iteratively instead.
    #[test]
    fn flat_map_chain_is_stack_safe() {
        let rt = Runtime::new(SynchronousStrategy::new());
        let mut program: Effect<i64, String> = Effect::succeed(0);
        const DEPTH: i64 = 1_000_000;
        for _ in 0..DEPTH {
            program = program.flat_map(|n| Effect::succeed(n + 1));
        }
        assert_eq!(rt.run_safely(program).unwrap(), DEPTH);
    }

    #[test]
    fn all_par_collects_results_in_input_order() {
        let rt = Runtime::new(CooperativeStrategy::new());
        let effects: Vec<Effect<i32, String>> = (0..8).map(|i| Effect::succeed(i)).collect();
        let result = rt.run_safely(Effect::all_par(effects)).unwrap();
        assert_eq!(result, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn all_par_fails_fast_on_first_failure() {
        let rt = Runtime::new(CooperativeStrategy::new());
        let effects: Vec<Effect<i32, String>> = vec![
            Effect::succeed(1),
            Effect::fail("boom".to_string()),
            Effect::never(),
        ];
        let result = rt.run_safely(Effect::all_par(effects));
        assert!(result.is_err());
        assert!(result.unwrap_err().contains(|e| e == "boom"));
    }

    #[test]
    fn race_returns_the_first_winner_and_interrupts_the_rest() {
        use crate::duration::Duration;

        let rt = Runtime::new(CooperativeStrategy::new());
        let fast: Effect<&'static str, String> = Effect::succeed("fast");
        let slow: Effect<&'static str, String> = Effect::sleep(Duration::from_secs(3600)).as_value("slow");
        let result = rt.run_safely(Effect::race(vec![fast, slow])).unwrap();
        assert_eq!(result, "fast");
    }

    #[test]
    fn race_waits_for_every_sibling_before_failing() {
        let rt = Runtime::new(CooperativeStrategy::new());
        let effects: Vec<Effect<i32, String>> =
            vec![Effect::fail("one".to_string()), Effect::fail("two".to_string())];
        let cause = rt.run_safely(Effect::race(effects)).unwrap_err();
        assert!(cause.contains(|e| e == "one"));
        assert!(cause.contains(|e| e == "two"));
        assert_eq!(cause.leaves().len(), 2);
    }

    #[test]
    fn race_lets_a_slower_sibling_win_over_an_immediate_failure() {
        use crate::duration::Duration;

        let rt = Runtime::new(CooperativeStrategy::new());
        let fails_immediately: Effect<&'static str, String> = Effect::fail("boom".to_string());
        let succeeds_after_a_sleep: Effect<&'static str, String> =
            Effect::sleep(Duration::from_millis(1)).as_value("winner");
        let result = rt
            .run_safely(Effect::race(vec![fails_immediately, succeeds_after_a_sleep]))
            .unwrap();
        assert_eq!(result, "winner");
    }
}

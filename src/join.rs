//! `JoinSet`: a named, bounded-fan-out convenience over `Scope` + repeated
//! `fork`, in the style of `common::runtime::join_set::JoinSet`.
//! Unlike `ParAll`/`Race` (which need eager fail-fast aggregation and so
//! drive their own hand-rolled join futures in `crate::interpreter`),
//! `JoinSet` folds children one at a time via `join_next`, matching how
//! callers actually want to drain a dynamically-sized, unnamed collection
//! of fibers forked under one scope.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
    },
};

use crate::{
    effect::{
        node::{
            AnyBox,
            Node,
        },
        Effect,
    },
    scope::{
        Fiber,
        FiberFailure,
        Scope,
    },
};

fn downcast<T: 'static>(boxed: AnyBox) -> T {
    *boxed
        .downcast::<T>()
        .unwrap_or_else(|_| panic!("effectual: internal type-erasure invariant violated"))
}

/// Every fiber spawned through a `JoinSet` is registered as a scope
/// finalizer that interrupts then joins it, so closing the owning scope
/// cancels and waits out every still-running member (§4.4's "any fork
/// inside k is registered with the scope", made explicit rather than
/// implicit: Rust has no ambient dynamic-scope state to thread through the
/// interpreter, so the registration here is opt-in per spawn).
pub struct JoinSet<T, E> {
    scope: Scope<E>,
    fibers: Arc<Mutex<VecDeque<Fiber<T, E>>>>,
}

impl<T, E> Clone for JoinSet<T, E> {
    fn clone(&self) -> Self {
        JoinSet {
            scope: self.scope.clone(),
            fibers: self.fibers.clone(),
        }
    }
}

impl<T, E> JoinSet<T, E>
where
    T: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(scope: Scope<E>) -> Self {
        JoinSet {
            scope,
            fibers: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Fork `effect`, registering the child with this set's scope and
    /// remembering it so `join_next` can drain it later.
    pub fn spawn(&self, effect: Effect<T, E>) -> Effect<Fiber<T, E>, E>
    where
        T: Clone,
    {
        let fibers = self.fibers.clone();
        let scope = self.scope.clone();
        effect.fork().map(move |fiber: Fiber<T, E>| {
            fibers.lock().unwrap().push_back(fiber.clone());
            let for_finalizer = fiber.clone();
            let state = for_finalizer.state.clone();
            let _ = scope.add(Arc::new(move || {
                for_finalizer.interrupt();
                Arc::new(Node::Join(state.clone()))
            }));
            fiber
        })
    }

    /// The next fiber to finish, in completion order, or `None` if the set
    /// is currently empty. A fiber that panicked reports its panic as data
    /// (`Err(FiberFailure::Panicked)`) rather than as this effect's own
    /// failure — joining is never itself a source of `Cause`.
    pub fn join_next(&self) -> Effect<Option<Result<T, FiberFailure<E>>>, E> {
        let next = self.fibers.lock().unwrap().pop_front();
        match next {
            None => Effect::succeed(None),
            Some(fiber) => {
                Effect::<Result<AnyBox, FiberFailure<E>>, E>::from_node(Node::Join(fiber.state.clone())).map(
                    |result: Result<AnyBox, FiberFailure<E>>| Some(result.map(downcast::<T>)),
                )
            },
        }
    }

    pub fn len(&self) -> usize {
        self.fibers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.lock().unwrap().is_empty()
    }
}

impl<E> Scope<E> {
    /// Build a `JoinSet` tied to this scope's lifetime.
    pub fn join_set<T>(&self) -> JoinSet<T, E>
    where
        T: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        JoinSet::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        duration::Duration,
        runtime::Runtime,
        scope::FiberFailure,
        strategy::CooperativeStrategy,
    };

    fn loop_forever() -> Effect<(), String> {
        Effect::sleep(Duration::from_millis(5)).flat_map(|_| Effect::suspend(loop_forever))
    }

    #[test]
    fn join_next_drains_every_spawned_member() {
        let rt = Runtime::new(CooperativeStrategy::new());
        let program: Effect<Vec<i32>, String> = Effect::scoped(|scope: Scope<String>| {
            let set = scope.join_set::<i32>();
            let a = set.spawn(Effect::succeed(1)).unit();
            let b = set.spawn(Effect::succeed(2)).unit();
            let set_for_drain = set.clone();
            a.flat_map(move |_| b.clone()).flat_map(move |_| {
                let set = set_for_drain.clone();
                Effect::suspend(move || {
                    let mut results = Vec::new();
                    let mut remaining = set.len();
                    while remaining > 0 {
                        remaining -= 1;
                        results.push(set.join_next());
                    }
                    Effect::all(results).map(|opts: Vec<Option<Result<i32, FiberFailure<String>>>>| {
                        opts.into_iter().flatten().filter_map(|r| r.ok()).collect()
                    })
                })
            })
        });
        let mut results = rt.run(program);
        results.sort();
        assert_eq!(results, vec![1, 2]);
    }

    #[test]
    fn interrupting_a_member_resolves_its_join_as_interrupted() {
        let observed: Arc<Mutex<Option<Result<(), FiberFailure<String>>>>> = Arc::new(Mutex::new(None));
        let for_program = observed.clone();
        let rt = Runtime::new(CooperativeStrategy::new());
        let program: Effect<(), String> = Effect::scoped(move |scope: Scope<String>| {
            let set = scope.join_set::<()>();
            let observed = for_program.clone();
            set.spawn(loop_forever()).flat_map(move |fiber| {
                fiber.interrupt();
                let observed = observed.clone();
                set.join_next().map(move |result| {
                    *observed.lock().unwrap() = result;
                })
            })
        });
        rt.run(program);
        match observed.lock().unwrap().take() {
            Some(Err(FiberFailure::Cause(cause))) => assert!(cause.is_interrupt()),
            other => panic!("expected an interrupted join, got {other:?}"),
        }
    }
}

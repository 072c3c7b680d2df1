//! The public `Effect<A, E>` algebra. See §3.1 and §4.1.
//!
//! `Effect` is an immutable description of a computation; building one does
//! no work. Interpretation happens only when a `Strategy` (or `Runtime`)
//! runs it (see `crate::interpreter`, `crate::strategy`).
//!
//! Both type parameters require `Clone`: `retry` (and, more generally,
//! re-running a built `Effect` value more than once) must be able to
//! re-enter the whole tree from the top, including re-producing any literal
//! success/failure payload baked into a leaf. A GC'd source language has no
//! such constraint; Rust's ownership model does. See `DESIGN.md`.

pub(crate) mod node;

mod combinators;
mod constructors;

pub use combinators::AsyncCompletion;

use std::{
    marker::PhantomData,
    sync::Arc,
};

use node::Node;

/// An immutable description of a computation that may succeed with `A`,
/// fail with a structured `Cause<E>`, and interact with a `Context` of
/// injected services.
pub struct Effect<A, E> {
    pub(crate) node: Arc<Node<E>>,
    _marker: PhantomData<fn() -> A>,
}

// Manual impl: `#[derive(Clone)]` would add a spurious `A: Clone` bound
// (derive can't see that `PhantomData<fn() -> A>` doesn't need it), and an
// `E: Clone` bound that isn't needed either, since cloning only bumps the
// `Arc`'s refcount.
impl<A, E> Clone for Effect<A, E> {
    fn clone(&self) -> Self {
        Effect {
            node: self.node.clone(),
            _marker: PhantomData,
        }
    }
}

impl<A, E> Effect<A, E> {
    pub(crate) fn from_node(node: Node<E>) -> Self {
        Effect {
            node: Arc::new(node),
            _marker: PhantomData,
        }
    }

    pub(crate) fn into_node(self) -> Arc<Node<E>> {
        self.node
    }
}

//! `Layer`: a composable recipe for building a `Context` (§4.5).
//! Grounded in the same closure-wrapping-an-immutable-value shape used by
//! `Schedule` (a `Layer` is, structurally, "an effect from `Context` to
//! `Context`" the same way a `Schedule` is "a function from decision state
//! to a next decision") so construction/combination reads the same way.

use std::sync::Arc;

use crate::{
    context::{
        Context,
        ServiceTag,
    },
    effect::Effect,
};

type BuildFn<E> = Arc<dyn Fn(Context) -> Effect<Context, E> + Send + Sync>;

/// A description of how to build part of a `Context`, to be run once when
/// a program is wired up rather than threaded through every call site by
/// hand. `Layer`s compose with `combine` (run side by side) and `and_then`
/// (run in sequence, later layers seeing earlier output), matching the
/// `combine`/`andThen`/`provideTo` trio named in §4.5.
#[derive(Clone)]
pub struct Layer<E> {
    build: BuildFn<E>,
}

impl<E> Layer<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Wrap an arbitrary `Context -> Effect<Context, E>` recipe.
    pub fn from_build(build: impl Fn(Context) -> Effect<Context, E> + Send + Sync + 'static) -> Self {
        Layer { build: Arc::new(build) }
    }

    /// A layer that binds a single, already-known value under `tag`,
    /// ignoring whatever `Context` it's given beyond extending it.
    pub fn succeed<T>(tag: ServiceTag<T>, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Layer::from_build(move |ctx: Context| Effect::succeed(ctx.with(tag, value.clone())))
    }

    /// A layer whose construction can itself fail or perform effects (e.g.
    /// opening a connection pool), binding the result under `tag`.
    pub fn effect<T>(tag: ServiceTag<T>, build: Effect<T, E>) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Layer::from_build(move |ctx: Context| {
            let ctx = ctx.clone();
            build.clone().map(move |value| ctx.with(tag, value))
        })
    }

    /// Run this layer's recipe against `input`, producing the `Context` it
    /// builds (which may or may not include `input`'s own bindings,
    /// depending on what `build` chooses to do with them).
    pub fn build(&self, input: Context) -> Effect<Context, E> {
        (self.build)(input)
    }

    /// Run both layers against the same `input` and merge their outputs,
    /// right-biased (`self` wins ties) — the independent-dependencies case,
    /// where neither layer needs what the other produces.
    pub fn combine(&self, other: &Layer<E>) -> Layer<E> {
        let a = self.clone();
        let b = other.clone();
        Layer::from_build(move |ctx: Context| {
            let ctx_for_b = ctx.clone();
            let b_built = b.build(ctx_for_b);
            a.build(ctx.clone()).flat_map(move |a_ctx| b_built.clone().map(move |b_ctx| b_ctx.merge(&a_ctx)))
        })
    }

    /// Run `self` first, then run `other` against `self`'s output merged
    /// into the original input — the dependent case, where `other` needs a
    /// service `self` provides.
    pub fn and_then(&self, other: &Layer<E>) -> Layer<E> {
        let a = self.clone();
        let b = other.clone();
        Layer::from_build(move |ctx: Context| {
            let b = b.clone();
            a.build(ctx.clone()).flat_map(move |a_ctx| b.build(a_ctx))
        })
    }

    /// Build this layer from an empty `Context` and run `effect` in the
    /// result. The usual way a program's `main` wires a `Layer` up to the
    /// effect it's meant to support.
    pub fn provide_to<A>(&self, effect: Effect<A, E>) -> Effect<A, E>
    where
        A: Clone + Send + Sync + 'static,
    {
        self.build(Context::empty()).flat_map(move |ctx| effect.clone().provide(ctx))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;

    static NAME: LazyLock<ServiceTag<String>> = LazyLock::new(|| ServiceTag::new("Name"));
    static COUNT: LazyLock<ServiceTag<u32>> = LazyLock::new(|| ServiceTag::new("Count"));

    #[test]
    fn succeed_binds_a_value() {
        let layer = Layer::<String>::succeed(*NAME, "svc".to_string());
        let ctx = crate::strategy::SynchronousStrategy::new();
        let rt = crate::runtime::Runtime::new(ctx);
        let built = rt.run(layer.build(Context::empty()));
        assert_eq!(*built.get(*NAME).unwrap(), "svc");
    }

    #[test]
    fn combine_merges_independent_bindings() {
        let a = Layer::<String>::succeed(*NAME, "svc".to_string());
        let b = Layer::<String>::succeed(*COUNT, 7);
        let combined = a.combine(&b);
        let rt = crate::runtime::Runtime::new(crate::strategy::SynchronousStrategy::new());
        let built = rt.run(combined.build(Context::empty()));
        assert_eq!(*built.get(*NAME).unwrap(), "svc");
        assert_eq!(*built.get(*COUNT).unwrap(), 7);
    }

    #[test]
    fn and_then_lets_the_second_layer_see_the_first() {
        let a = Layer::<String>::succeed(*COUNT, 3);
        let b: Layer<String> = Layer::from_build(|ctx: Context| {
            let n = *ctx.get(*COUNT).unwrap();
            Effect::succeed(ctx.with(*COUNT, n * 10))
        });
        let chained = a.and_then(&b);
        let rt = crate::runtime::Runtime::new(crate::strategy::SynchronousStrategy::new());
        let built = rt.run(chained.build(Context::empty()));
        assert_eq!(*built.get(*COUNT).unwrap(), 30);
    }
}

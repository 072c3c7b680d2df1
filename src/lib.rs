//! An effect system core: an immutable `Effect<A, E>` algebra interpreted by
//! a stack-safe trampoline, three execution strategies (synchronous,
//! cooperative, and a deterministic virtual-clock test strategy), a
//! structured `Cause<E>` failure algebra, `Context`/`Layer` dependency
//! injection, and `Scope`/`Fiber` structured concurrency.
//!
//! Building an `Effect` does no work; nothing runs until a [`Runtime`] (or a
//! bare [`strategy::Strategy`]) interprets it.
//!
//! ```ignore
//! use effectual::{Effect, Runtime, strategy::SynchronousStrategy};
//!
//! let rt = Runtime::new(SynchronousStrategy::new());
//! let program: Effect<i32, String> = Effect::succeed(1).map(|x| x + 1);
//! assert_eq!(rt.run(program), 2);
//! ```

pub mod cause;
pub mod clock;
pub mod context;
pub mod duration;
pub mod effect;
pub mod env;
pub mod join;
pub mod layer;
pub mod logging;
pub mod metrics;
pub mod runtime;
pub mod schedule;
pub mod scope;
pub mod strategy;

pub(crate) mod interpreter;

pub use cause::Cause;
pub use context::{
    Context,
    ServiceTag,
};
pub use effect::Effect;
pub use join::JoinSet;
pub use layer::Layer;
pub use runtime::{
    default_runtime,
    set_default_runtime,
    RunOutcome,
    Runtime,
};
pub use schedule::Schedule;
pub use scope::{
    Fiber,
    FiberFailure,
    Scope,
};

//! The structured failure algebra. See §3.2.
//!
//! A `Cause<E>` is never silently discarded by the interpreter: `Catch` only
//! consumes causes whose leaf matches, and finalizer failures are always
//! joined onto whatever cause (if any) was already in flight.

use std::{
    fmt,
    sync::Arc,
};

/// Distinguishes an ordinary cooperative cancellation from the timeout
/// mechanism, which is built on interruption but needs to be detectable by
/// callers (§7: "Timeout — a distinguished subclass of Interrupt").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterruptReason {
    Cancelled,
    Timeout,
}

/// Structured failure value produced by a failing `Effect`.
///
/// `Parallel` and `Sequential` are never empty: the smart constructors
/// (`Cause::parallel`, `Cause::sequential`) collapse an empty input to
/// `None`-shaped call sites being a programming error, and collapse a
/// singleton input down to the single cause it wraps.
#[derive(Clone, Debug)]
pub enum Cause<E> {
    Fail(E),
    Interrupt(InterruptReason),
    Parallel(Vec<Cause<E>>),
    Sequential(Vec<Cause<E>>),
    /// An infrastructure defect with no `E` to carry it: a missing wiring
    /// dependency (e.g. `ServiceNotFound`) rather than a typed domain
    /// failure. Distinct from `Fail` so a caller that only handles its own
    /// `E` can't accidentally catch a wiring bug as if it were a normal
    /// error.
    Die(Arc<anyhow::Error>),
}

impl<E> Cause<E> {
    pub fn fail(error: E) -> Self {
        Cause::Fail(error)
    }

    pub fn interrupt() -> Self {
        Cause::Interrupt(InterruptReason::Cancelled)
    }

    pub fn timeout() -> Self {
        Cause::Interrupt(InterruptReason::Timeout)
    }

    pub fn die(error: impl Into<anyhow::Error>) -> Self {
        Cause::Die(Arc::new(error.into()))
    }

    /// Build a `Parallel` cause from a non-empty list of causes, collapsing
    /// a singleton to the cause it contains. Panics on an empty list: that
    /// indicates an interpreter bug (a parallel combinator that claims to
    /// have failed siblings but recorded none of their causes).
    pub fn parallel(mut causes: Vec<Cause<E>>) -> Self {
        assert!(!causes.is_empty(), "Cause::Parallel requires at least one cause");
        if causes.len() == 1 {
            causes.pop().unwrap()
        } else {
            Cause::Parallel(causes)
        }
    }

    /// Build a `Sequential` cause from a non-empty list of causes, collapsing
    /// a singleton to the cause it contains.
    pub fn sequential(mut causes: Vec<Cause<E>>) -> Self {
        assert!(!causes.is_empty(), "Cause::Sequential requires at least one cause");
        if causes.len() == 1 {
            causes.pop().unwrap()
        } else {
            Cause::Sequential(causes)
        }
    }

    /// Join a finalizer's failure onto this cause. Per §4.1/§7, a
    /// finalizer failure is always appended as a new `Sequential` stage,
    /// never discarded and never allowed to shadow the original.
    pub fn then(self, next: Cause<E>) -> Cause<E> {
        let mut stages = match self {
            Cause::Sequential(stages) => stages,
            other => vec![other],
        };
        match next {
            Cause::Sequential(mut more) => stages.append(&mut more),
            other => stages.push(other),
        }
        Cause::sequential(stages)
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, Cause::Interrupt(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Cause::Interrupt(InterruptReason::Timeout))
    }

    /// True if any leaf `Fail` in this cause tree satisfies `pred`.
    pub fn contains(&self, pred: impl Fn(&E) -> bool) -> bool {
        self.contains_ref(&pred)
    }

    fn contains_ref(&self, pred: &impl Fn(&E) -> bool) -> bool {
        match self {
            Cause::Fail(e) => pred(e),
            Cause::Interrupt(_) => false,
            Cause::Die(_) => false,
            Cause::Parallel(cs) | Cause::Sequential(cs) => cs.iter().any(|c| c.contains_ref(pred)),
        }
    }

    /// Map every leaf error, preserving the cause's shape.
    pub fn map<F, B>(self, mut f: F) -> Cause<B>
    where
        F: FnMut(E) -> B,
    {
        self.map_ref(&mut f)
    }

    fn map_ref<F, B>(self, f: &mut F) -> Cause<B>
    where
        F: FnMut(E) -> B,
    {
        match self {
            Cause::Fail(e) => Cause::Fail(f(e)),
            Cause::Interrupt(r) => Cause::Interrupt(r),
            Cause::Die(e) => Cause::Die(e),
            Cause::Parallel(cs) => Cause::Parallel(cs.into_iter().map(|c| c.map_ref(f)).collect()),
            Cause::Sequential(cs) => {
                Cause::Sequential(cs.into_iter().map(|c| c.map_ref(f)).collect())
            },
        }
    }

    /// Collect every leaf `Fail` error, in left-to-right order.
    pub fn leaves(&self) -> Vec<&E> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a E>) {
        match self {
            Cause::Fail(e) => out.push(e),
            Cause::Interrupt(_) => {},
            Cause::Die(_) => {},
            Cause::Parallel(cs) | Cause::Sequential(cs) => {
                for c in cs {
                    c.collect_leaves(out);
                }
            },
        }
    }

    /// A structured, indented tree with unicode markers, per §7.
    pub fn pretty_print(&self) -> String
    where
        E: fmt::Display,
    {
        let mut out = String::new();
        self.pretty_into(&mut out, 0);
        out
    }

    fn pretty_into(&self, out: &mut String, depth: usize)
    where
        E: fmt::Display,
    {
        let indent = "  ".repeat(depth);
        match self {
            Cause::Fail(e) => out.push_str(&format!("{indent}✗ {e}\n")),
            Cause::Interrupt(InterruptReason::Cancelled) => {
                out.push_str(&format!("{indent}⦻ interrupted\n"))
            },
            Cause::Interrupt(InterruptReason::Timeout) => {
                out.push_str(&format!("{indent}⏱ timed out\n"))
            },
            Cause::Die(e) => out.push_str(&format!("{indent}☠ died: {e}\n")),
            Cause::Parallel(cs) => {
                out.push_str(&format!("{indent}⇉ parallel\n"));
                for c in cs {
                    c.pretty_into(out, depth + 1);
                }
            },
            Cause::Sequential(cs) => {
                out.push_str(&format!("{indent}→ sequential\n"));
                for c in cs {
                    c.pretty_into(out, depth + 1);
                }
            },
        }
    }
}

/// A composite error produced when collapsing a `Cause` down to a single
/// exception at a language boundary (`Runtime::run`).
#[derive(Clone, Debug)]
pub enum ToExceptionError<E> {
    Leaf(E),
    Interrupted,
    TimedOut,
    Died(Arc<anyhow::Error>),
    Parallel(Vec<ToExceptionError<E>>),
}

impl<E: fmt::Display> fmt::Display for ToExceptionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToExceptionError::Leaf(e) => write!(f, "{e}"),
            ToExceptionError::Interrupted => write!(f, "fiber was interrupted"),
            ToExceptionError::TimedOut => write!(f, "fiber timed out"),
            ToExceptionError::Died(e) => write!(f, "{e}"),
            ToExceptionError::Parallel(errs) => {
                let joined = errs.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                write!(f, "{} failures occurred in parallel: {joined}", errs.len())
            },
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for ToExceptionError<E> {}

impl<E: fmt::Display + fmt::Debug + Clone> Cause<E> {
    /// Convert this cause to a single throwable error, per §3.2/§7:
    /// for `Sequential`, the last leaf wins; for `Parallel`, a composite
    /// wrapper carrying every sibling's error.
    pub fn to_exception(&self) -> ToExceptionError<E> {
        match self {
            Cause::Fail(e) => ToExceptionError::Leaf(e.clone()),
            Cause::Interrupt(InterruptReason::Cancelled) => ToExceptionError::Interrupted,
            Cause::Interrupt(InterruptReason::Timeout) => ToExceptionError::TimedOut,
            Cause::Die(e) => ToExceptionError::Died(e.clone()),
            Cause::Sequential(cs) => cs
                .last()
                .expect("Sequential cause is never empty")
                .to_exception(),
            Cause::Parallel(cs) => {
                ToExceptionError::Parallel(cs.iter().map(|c| c.to_exception()).collect())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_parallel_collapses() {
        let c: Cause<&str> = Cause::parallel(vec![Cause::fail("boom")]);
        assert!(matches!(c, Cause::Fail("boom")));
    }

    #[test]
    fn then_accumulates_sequential_stages() {
        let c = Cause::fail("primary").then(Cause::fail("finalizer"));
        match c {
            Cause::Sequential(stages) => {
                assert_eq!(stages.len(), 2);
            },
            other => panic!("expected Sequential, got {other:?}"),
        }
    }

    #[test]
    fn contains_searches_leaves() {
        let c: Cause<i32> = Cause::parallel(vec![Cause::fail(1), Cause::fail(2)]);
        assert!(c.contains(|e| *e == 2));
        assert!(!c.contains(|e| *e == 3));
    }

    #[test]
    fn to_exception_sequential_is_last_leaf() {
        let c = Cause::fail("first").then(Cause::fail("second"));
        match c.to_exception() {
            ToExceptionError::Leaf(e) => assert_eq!(e, "second"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pretty_print_marks_each_variant() {
        let c = Cause::parallel(vec![Cause::fail("a"), Cause::interrupt()]);
        let s = c.pretty_print();
        assert!(s.contains("⇉ parallel"));
        assert!(s.contains("✗ a"));
        assert!(s.contains("⦻ interrupted"));
    }
}

//! Immutable service map. See §3.4 and the "Dynamic service lookup"
//! design note (§9): services are keyed by an opaque, strongly-typed
//! `ServiceTag<T>` rather than by a dynamic class name.

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Arc,
    },
};

static NEXT_TAG_ID: AtomicU64 = AtomicU64::new(0);

/// An opaque, stable identity for a service of type `T`. Two tags are equal
/// only if they're the same `new()` call: same-typed tags built from
/// separate calls (e.g. two `ServiceTag::<u32>::new(..)`, one for a port and
/// one for a retry count) are distinct identities, not aliases of each
/// other. The `name` is carried purely for diagnostics (it shows up in
/// `ServiceNotFound`'s `Display`).
pub struct ServiceTag<T> {
    id: u64,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ServiceTag<T> {
    pub fn new(name: &'static str) -> Self {
        ServiceTag {
            id: NEXT_TAG_ID.fetch_add(1, Ordering::Relaxed),
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn id(&self) -> u64 {
        self.id
    }
}

impl<T> Clone for ServiceTag<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for ServiceTag<T> {}

impl<T> fmt::Debug for ServiceTag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceTag({})", self.name)
    }
}

/// Raised by `Effect::service(tag)` when the active `Context` has no binding
/// for `tag`.
#[derive(Clone, Debug, thiserror::Error)]
#[error("service not found: {0}")]
pub struct ServiceNotFound(pub &'static str);

/// An immutable mapping from `ServiceTag<T>` identity to a bound `T` value.
/// `with` and `merge` never mutate `self`; they return a new `Context` that
/// shares structure with the original via `Arc`.
#[derive(Clone)]
pub struct Context {
    services: Arc<HashMap<u64, Arc<dyn Any + Send + Sync>>>,
}

impl Context {
    pub fn empty() -> Self {
        Context {
            services: Arc::new(HashMap::new()),
        }
    }

    pub fn with<T: Send + Sync + 'static>(&self, tag: ServiceTag<T>, value: T) -> Context {
        let mut services = (*self.services).clone();
        services.insert(tag.id(), Arc::new(value));
        Context {
            services: Arc::new(services),
        }
    }

    pub fn get<T: Send + Sync + 'static>(&self, tag: ServiceTag<T>) -> Result<Arc<T>, ServiceNotFound> {
        self.services
            .get(&tag.id())
            .and_then(|v| v.clone().downcast::<T>().ok())
            .ok_or(ServiceNotFound(tag.name()))
    }

    pub fn has<T: Send + Sync + 'static>(&self, tag: ServiceTag<T>) -> bool {
        self.services.contains_key(&tag.id())
    }

    /// Right-biased merge: services in `other` win on key collision.
    pub fn merge(&self, other: &Context) -> Context {
        let mut merged = (*self.services).clone();
        for (k, v) in other.services.iter() {
            merged.insert(*k, v.clone());
        }
        Context {
            services: Arc::new(merged),
        }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Context({} services)", self.services.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;

    static DB: LazyLock<ServiceTag<String>> = LazyLock::new(|| ServiceTag::new("Database"));
    static COUNT: LazyLock<ServiceTag<u32>> = LazyLock::new(|| ServiceTag::new("Counter"));

    #[test]
    fn empty_context_has_nothing() {
        let ctx = Context::empty();
        assert!(!ctx.has(*DB));
        assert!(ctx.get(*DB).is_err());
    }

    #[test]
    fn with_binds_and_preserves_the_original() {
        let base = Context::empty();
        let extended = base.with(*DB, "postgres://".to_string());
        assert!(!base.has(*DB));
        assert_eq!(*extended.get(*DB).unwrap(), "postgres://");
    }

    #[test]
    fn merge_is_right_biased() {
        let a = Context::empty().with(*COUNT, 1);
        let b = Context::empty().with(*COUNT, 2);
        let merged = a.merge(&b);
        assert_eq!(*merged.get(*COUNT).unwrap(), 2);
    }

    #[test]
    fn distinct_tags_for_distinct_types_do_not_collide() {
        let ctx = Context::empty().with(*DB, "x".to_string()).with(*COUNT, 7);
        assert_eq!(*ctx.get(*DB).unwrap(), "x");
        assert_eq!(*ctx.get(*COUNT).unwrap(), 7);
    }

    #[test]
    fn distinct_tags_of_the_same_type_do_not_collide() {
        static PORT: LazyLock<ServiceTag<u32>> = LazyLock::new(|| ServiceTag::new("Port"));
        static MAX_RETRIES: LazyLock<ServiceTag<u32>> = LazyLock::new(|| ServiceTag::new("MaxRetries"));

        let ctx = Context::empty().with(*PORT, 8080).with(*MAX_RETRIES, 3);
        assert_eq!(*ctx.get(*PORT).unwrap(), 8080);
        assert_eq!(*ctx.get(*MAX_RETRIES).unwrap(), 3);
    }
}

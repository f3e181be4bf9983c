//! Service descriptors and the implementations they bind.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{BoxError, DiError};
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::provider::Dependencies;
use crate::traits::{AsyncDispose, Dispose};

/// Type-erased shared instance as stored in every cache.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Boxed, sendable future used for constructors and release hooks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub(crate) type CtorFn =
    dyn Fn(Dependencies) -> BoxFuture<'static, Result<AnyArc, BoxError>> + Send + Sync;
pub(crate) type ReleaseFn = dyn Fn(AnyArc) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync;

/// Identity of one registration or override.
///
/// Every call to [`ServiceDescriptor::new`] yields a fresh id, so caches keyed
/// by `(Key, BindingId)` never hand out an instance built from a binding that
/// has since been replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        BindingId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for logs.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A constructible implementation: factory, declared requirements and an
/// optional release hook.
///
/// Factories receive a [`Dependencies`] bundle holding the already-built
/// instances for every declared requirement, in declaration order.
///
/// # Examples
///
/// ```rust
/// use tessera_di::{keys, Implementation};
///
/// struct Config { url: String }
/// struct Database { url: String }
///
/// let db = Implementation::factory::<Database, _>(keys![Config], |deps| {
///     let config = deps.get::<Config>()?;
///     Ok(Database { url: config.url.clone() })
/// });
///
/// assert_eq!(db.requires().len(), 1);
/// assert!(!db.has_release_hook());
/// ```
#[derive(Clone)]
pub struct Implementation {
    type_name: &'static str,
    impl_id: Option<TypeId>,
    requires: Vec<Key>,
    ctor: Arc<CtorFn>,
    release: Option<Arc<ReleaseFn>>,
}

impl Implementation {
    /// Lowest-level constructor: a type-erased async factory.
    pub fn from_fn<F>(type_name: &'static str, requires: Vec<Key>, ctor: F) -> Self
    where
        F: Fn(Dependencies) -> BoxFuture<'static, Result<AnyArc, BoxError>> + Send + Sync + 'static,
    {
        Self {
            type_name,
            impl_id: None,
            requires,
            ctor: Arc::new(ctor),
            release: None,
        }
    }

    /// A pre-built value, shared by every resolution.
    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        let shared: AnyArc = Arc::new(value);
        Self::from_fn(type_name::<T>(), Vec::new(), move |_| {
            let shared = shared.clone();
            Box::pin(async move { Ok::<AnyArc, BoxError>(shared) })
        })
        .with_impl_id(TypeId::of::<T>())
    }

    /// A synchronous factory for a concrete type.
    pub fn factory<T, F>(requires: Vec<Key>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::from_fn(type_name::<T>(), requires, move |deps| {
            let built = factory(&deps).map(|value| Arc::new(value) as AnyArc);
            Box::pin(std::future::ready(built))
        })
        .with_impl_id(TypeId::of::<T>())
    }

    /// An async factory for a concrete type.
    ///
    /// The factory owns its [`Dependencies`], so it may hold them across
    /// awaits and use [`Dependencies::resolver`] for lazy lookups.
    pub fn async_factory<T, F, Fut>(requires: Vec<Key>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self::from_fn(type_name::<T>(), requires, move |deps| {
            let pending = factory(deps);
            Box::pin(async move { pending.await.map(|value| Arc::new(value) as AnyArc) })
        })
        .with_impl_id(TypeId::of::<T>())
    }

    /// A pre-built trait object.
    ///
    /// Trait instances are stored as `Arc<Arc<dyn Trait>>` behind the erased
    /// pointer; [`Resolver::get_trait`](crate::Resolver::get_trait) unwraps them.
    pub fn trait_instance<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        let shared: AnyArc = Arc::new(value);
        Self::from_fn(type_name::<T>(), Vec::new(), move |_| {
            let shared = shared.clone();
            Box::pin(async move { Ok::<AnyArc, BoxError>(shared) })
        })
    }

    /// A synchronous factory producing a trait object.
    pub fn trait_factory<T, F>(requires: Vec<Key>, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Dependencies) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        Self::from_fn(type_name::<T>(), requires, move |deps| {
            let built = factory(&deps).map(|value| Arc::new(value) as AnyArc);
            Box::pin(std::future::ready(built))
        })
    }

    /// An async factory producing a trait object.
    pub fn async_trait_factory<T, F, Fut>(requires: Vec<Key>, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, BoxError>> + Send + 'static,
    {
        Self::from_fn(type_name::<T>(), requires, move |deps| {
            let pending = factory(deps);
            Box::pin(async move { pending.await.map(|value| Arc::new(value) as AnyArc) })
        })
    }

    /// Attach a release hook that receives the erased instance at teardown.
    ///
    /// The instance is held by whichever session built it until that session
    /// ends: a scope keeps it until [`Scope::close`](crate::Scope::close), the
    /// provider until [`ServiceProvider::dispose_all`](crate::ServiceProvider::dispose_all).
    /// For a transient resolved outside a scope that means every instance ever
    /// built stays alive until disposal; resolve such transients inside a
    /// scope. The first root-level resolution of one logs a warning.
    pub fn on_release<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(AnyArc) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let hook: Arc<ReleaseFn> =
            Arc::new(move |instance: AnyArc| -> BoxFuture<'static, Result<(), BoxError>> {
                Box::pin(hook(instance))
            });
        self.release = Some(hook);
        self
    }

    /// Release instances through their [`Dispose`] impl.
    pub fn with_dispose<T: Dispose>(self) -> Self {
        self.on_release(|instance: AnyArc| async move {
            let service = instance
                .downcast::<T>()
                .map_err(|_| DiError::TypeMismatch(type_name::<T>()))?;
            service.dispose()
        })
    }

    /// Release instances through their [`AsyncDispose`] impl.
    pub fn with_async_dispose<T: AsyncDispose>(self) -> Self {
        self.on_release(|instance: AnyArc| async move {
            let service = instance
                .downcast::<T>()
                .map_err(|_| DiError::TypeMismatch(type_name::<T>()))?;
            service.dispose().await
        })
    }

    fn with_impl_id(mut self, id: TypeId) -> Self {
        self.impl_id = Some(id);
        self
    }

    /// Requirements declared at registration, in order.
    pub fn requires(&self) -> &[Key] {
        &self.requires
    }

    /// Name of the produced type or trait.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// TypeId of the produced concrete type; `None` for trait implementations.
    pub fn impl_type_id(&self) -> Option<TypeId> {
        self.impl_id
    }

    pub fn has_release_hook(&self) -> bool {
        self.release.is_some()
    }

    pub(crate) fn construct(&self, deps: Dependencies) -> BoxFuture<'static, Result<AnyArc, BoxError>> {
        (self.ctor)(deps)
    }

    pub(crate) fn release_hook(&self) -> Option<Arc<ReleaseFn>> {
        self.release.clone()
    }

    /// Identity shared by clones of the same implementation.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.ctor) as *const () as usize
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("type_name", &self.type_name)
            .field("requires", &self.requires)
            .field("has_release_hook", &self.release.is_some())
            .finish()
    }
}

/// A registered binding: capability, lifetime and implementation.
///
/// Descriptors are immutable once registered and shared as
/// `Arc<ServiceDescriptor>`; re-registering a key installs a new descriptor
/// with a new [`BindingId`].
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    /// The capability key (type/trait name with optional service name)
    pub key: Key,
    /// Service lifetime
    pub lifetime: Lifetime,
    /// What gets constructed
    pub implementation: Implementation,
    id: BindingId,
}

impl ServiceDescriptor {
    pub fn new(key: Key, lifetime: Lifetime, implementation: Implementation) -> Self {
        Self {
            key,
            lifetime,
            implementation,
            id: BindingId::next(),
        }
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    /// Type or trait name of the capability
    pub fn type_name(&self) -> &'static str {
        self.key.display_name()
    }

    /// Service name for named bindings
    pub fn service_name(&self) -> Option<&'static str> {
        self.key.service_name()
    }

    pub fn is_named(&self) -> bool {
        self.key.is_named()
    }

    /// Name of the type the implementation produces
    pub fn impl_type_name(&self) -> &'static str {
        self.implementation.type_name()
    }
}

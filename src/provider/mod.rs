//! Service provider: the resolving side of the container.
//!
//! A [`ServiceProvider`] owns the binding registry, the singleton store, the
//! provider-level teardown list and the ambient override layer. Scope
//! sessions ([`Scope`]) hang off it and share all of that, adding their own
//! scoped cache, teardown list and overrides.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::ContainerOptions;
use crate::descriptors::{AnyArc, BindingId, Implementation, ServiceDescriptor};
use crate::error::{DiError, DiResult};
use crate::graph::{ConstructionNode, ConstructionPlan};
use crate::internal::{release_reverse, DisposeBag, ResolutionChain, TeardownEntry};
use crate::introspect::DependencyIntrospector;
use crate::key::{key_of_trait, key_of_type, Key};
use crate::lifetime::Lifetime;
use crate::observer::Observers;
use crate::overrides::{OverrideGuard, OverrideLayer};
use crate::registration::Registry;
use crate::traits::{Resolver, ResolverCore};
use crate::validation::{validate_registry, ValidationReport};

mod context;
mod lifetimes;
mod resolver;
mod scope;

pub use context::{Dependencies, ResolverContext};
pub(crate) use lifetimes::{CacheKey, InstanceCache};
pub use scope::{Scope, ScopeId};

/// Resolves capabilities registered in a [`ServiceCollection`](crate::ServiceCollection).
///
/// Cloning is cheap; clones share the same registry, singletons and
/// overrides. Every resolution first plans the full dependency graph and only
/// then runs factories, leaves first, so a missing binding, a cycle or a
/// singleton capturing a scoped service is reported before anything is built.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tessera_di::{keys, Resolver, ServiceCollection};
///
/// struct Database {
///     url: String,
/// }
///
/// struct UserService {
///     db: Arc<Database>,
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), tessera_di::DiError> {
/// let mut services = ServiceCollection::new();
/// services.add_singleton(Database { url: "postgres://localhost".into() });
/// services.add_transient_factory::<UserService, _>(keys![Database], |deps| {
///     Ok(UserService { db: deps.get::<Database>()? })
/// });
///
/// let provider = services.build();
/// let users = provider.get::<UserService>().await?;
/// assert_eq!(users.db.url, "postgres://localhost");
/// provider.dispose_all().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

pub(crate) struct ProviderInner {
    pub(crate) registry: RwLock<Registry>,
    pub(crate) singletons: InstanceCache,
    pub(crate) root_disposers: Mutex<DisposeBag>,
    pub(crate) overrides: Arc<OverrideLayer>,
    pub(crate) introspector: RwLock<Arc<dyn DependencyIntrospector>>,
    pub(crate) observers: Observers,
    pub(crate) options: ContainerOptions,
    // root-level transients already warned about
    warned_transients: Mutex<HashSet<BindingId>>,
}

impl ServiceProvider {
    pub(crate) fn new(
        registry: Registry,
        observers: Observers,
        introspector: Arc<dyn DependencyIntrospector>,
        options: ContainerOptions,
    ) -> Self {
        debug!(bindings = registry.len(), observers = observers.len(), "service provider built");
        Self {
            inner: Arc::new(ProviderInner {
                registry: RwLock::new(registry),
                singletons: InstanceCache::default(),
                root_disposers: Mutex::new(DisposeBag::default()),
                overrides: Arc::new(OverrideLayer::default()),
                introspector: RwLock::new(introspector),
                observers,
                options,
                warned_transients: Mutex::new(HashSet::new()),
            }),
        }
    }

    #[inline]
    pub(crate) fn inner(&self) -> &ProviderInner {
        &self.inner
    }

    /// Open a scope session.
    pub fn create_scope(&self) -> Scope {
        Scope::new(self.clone(), None)
    }

    /// Close a scope session; same as [`Scope::close`].
    pub async fn close_scope(&self, scope: &Scope) -> DiResult<()> {
        scope.close().await
    }

    /// Resolve `key`, inside `scope` when one is given.
    ///
    /// Without a scope, scoped services (and anything built on them) fail
    /// with [`DiError::NoActiveScope`].
    pub async fn resolve(&self, key: &Key, scope: Option<&Scope>) -> DiResult<AnyArc> {
        resolver::resolve(self, scope, key, &ResolutionChain::default()).await
    }

    /// Resolve the capability registered under `alias`.
    pub async fn resolve_alias(&self, alias: &str, scope: Option<&Scope>) -> DiResult<AnyArc> {
        let key = self.inner.registry.read().alias(alias)?.clone();
        self.resolve(&key, scope).await
    }

    /// The construction plan `resolve(key, scope)` would execute now.
    ///
    /// Cached instances appear as nodes without dependencies.
    pub fn plan(&self, key: &Key, scope: Option<&Scope>) -> DiResult<ConstructionPlan> {
        resolver::plan(self, key, scope, &ResolutionChain::default())
    }

    /// Bind `key`, replacing any earlier binding.
    ///
    /// Fails with [`DiError::LiveSingleton`] once a singleton of `key` has
    /// been constructed or while one is being constructed; use an override to
    /// shadow it instead.
    pub fn register(&self, key: Key, lifetime: Lifetime, implementation: Implementation) -> DiResult<()> {
        let mut registry = self.inner.registry.write();
        let singletons = &self.inner.singletons;
        if singletons.has_live(&key) || singletons.in_flight(&key) {
            return Err(DiError::LiveSingleton(key));
        }
        registry.register(key, lifetime, implementation);
        Ok(())
    }

    pub fn add_alias(&self, alias: impl Into<String>, key: Key) -> DiResult<()> {
        self.inner.registry.write().add_alias(alias, key)
    }

    /// Shadow `key` for every resolution on this provider and its scopes.
    pub fn with_override(&self, key: Key, lifetime: Lifetime, implementation: Implementation) -> OverrideGuard {
        self.inner
            .overrides
            .install(ServiceDescriptor::new(key, lifetime, implementation))
    }

    pub fn override_instance<T: Send + Sync + 'static>(&self, value: T) -> OverrideGuard {
        self.with_override(key_of_type::<T>(), Lifetime::Transient, Implementation::instance(value))
    }

    pub fn override_trait<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> OverrideGuard {
        self.with_override(key_of_trait::<T>(), Lifetime::Transient, Implementation::trait_instance(value))
    }

    /// Swap the dependency introspector; the next plan uses the new one.
    pub fn replace_introspector(&self, introspector: Arc<dyn DependencyIntrospector>) {
        *self.inner.introspector.write() = introspector;
        debug!("dependency introspector replaced");
    }

    pub fn is_registered(&self, key: &Key) -> bool {
        self.inner.registry.read().contains_key(key)
    }

    /// Registered descriptors in registration order.
    pub fn descriptors(&self) -> Vec<Arc<ServiceDescriptor>> {
        self.inner.registry.read().iter().cloned().collect()
    }

    /// Number of constructed singletons.
    pub fn singleton_count(&self) -> usize {
        self.inner.singletons.live_count()
    }

    /// Plan every registered binding against the current registry.
    pub fn validate(&self) -> ValidationReport {
        let introspector = self.inner.introspector.read().clone();
        let registry = self.inner.registry.read();
        validate_registry(&registry, introspector.as_ref(), self.inner.options.max_depth)
    }

    /// Whether `descriptor` is still the registered binding for its key.
    pub(crate) fn is_current(&self, descriptor: &ServiceDescriptor) -> bool {
        self.inner
            .registry
            .read()
            .get(&descriptor.key)
            .map_or(false, |registered| registered.id() == descriptor.id())
    }

    pub(crate) fn warn_root_transient(&self, node: &ConstructionNode) {
        if self.inner.warned_transients.lock().insert(node.descriptor().id()) {
            warn!(
                capability = %node.key(),
                "transient with a release hook resolved outside a scope; instances are held until dispose_all()"
            );
        }
    }

    pub(crate) fn track(&self, entry: TeardownEntry) -> Result<(), TeardownEntry> {
        self.inner.root_disposers.lock().push(entry)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.root_disposers.lock().is_sealed()
    }

    /// Release every provider-owned instance, newest first.
    ///
    /// Ambient overrides are removed and the singleton store is emptied. Every
    /// release hook runs even if some fail; failures come back together as
    /// [`DiError::Teardown`]. Afterwards every resolution fails with
    /// [`DiError::Disposed`]. Disposing twice is a no-op.
    pub async fn dispose_all(&self) -> DiResult<()> {
        let entries = {
            let mut bag = self.inner.root_disposers.lock();
            if bag.is_sealed() {
                return Ok(());
            }
            bag.seal()
        };
        self.inner.overrides.clear();

        let released = entries.len();
        let failures = release_reverse(entries, None).await;
        self.inner.singletons.clear();

        debug!(released, failed = failures.len(), "service provider disposed");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::Teardown(failures))
        }
    }

    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        use std::fmt::Write as _;

        let registry = self.inner.registry.read();
        let mut out = String::new();
        let _ = writeln!(out, "=== Service Provider ===");
        let _ = writeln!(out, "Bindings ({}):", registry.len());
        for descriptor in registry.iter() {
            let live = self.inner.singletons.peek(&CacheKey::new(descriptor.key.clone(), descriptor.id()));
            let _ = writeln!(
                out,
                "  {} -> {} [{}]{}",
                descriptor.key,
                descriptor.impl_type_name(),
                descriptor.lifetime,
                if live.is_some() { " (live)" } else { "" }
            );
        }
        let _ = writeln!(out, "Ambient overrides: {}", self.inner.overrides.len());
        let _ = writeln!(out, "Disposed: {}", self.is_disposed());
        out
    }
}

#[async_trait]
impl ResolverCore for ServiceProvider {
    async fn resolve_any(&self, key: &Key) -> DiResult<AnyArc> {
        self.resolve(key, None).await
    }
}

impl Resolver for ServiceProvider {}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("bindings", &self.inner.registry.read().len())
            .field("singletons", &self.singleton_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Drop for ProviderInner {
    fn drop(&mut self) {
        let bag = self.root_disposers.get_mut();
        if !bag.is_sealed() && !bag.is_empty() && self.options.warn_on_undisposed {
            warn!(
                pending = bag.len(),
                "service provider dropped with instances awaiting release; call dispose_all().await before dropping"
            );
        }
    }
}

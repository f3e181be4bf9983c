//! Scope sessions: per-session instance cache, teardown list and overrides.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::descriptors::{AnyArc, Implementation, ServiceDescriptor};
use crate::error::{DiError, DiResult};
use crate::internal::{release_reverse, DisposeBag, ResolutionChain, TeardownEntry};
use crate::key::{key_of_trait, key_of_type, Key};
use crate::lifetime::Lifetime;
use crate::overrides::{OverrideGuard, OverrideLayer};
use crate::traits::{Resolver, ResolverCore};

use super::lifetimes::InstanceCache;
use super::{resolver, ServiceProvider};

/// Identity of a scope session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ScopeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// A scope session.
///
/// Scoped services resolve to one instance per session. Instances with a
/// release hook are released in reverse construction order by
/// [`Scope::close`]; after that every resolution through the scope fails with
/// [`DiError::ScopeClosed`]. Overrides installed on the scope are visible to
/// it and to its child scopes, and are removed when it closes.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use tessera_di::{Resolver, ServiceCollection};
///
/// struct RequestId(u64);
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), tessera_di::DiError> {
/// let mut services = ServiceCollection::new();
/// services.add_scoped_factory::<RequestId, _>(vec![], |_| Ok(RequestId(7)));
/// let provider = services.build();
///
/// let scope = provider.create_scope();
/// let first = scope.get::<RequestId>().await?;
/// let second = scope.get::<RequestId>().await?;
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(first.0, 7);
/// scope.close().await?;
///
/// let next = provider.create_scope();
/// assert!(!Arc::ptr_eq(&first, &next.get::<RequestId>().await?));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

pub(crate) struct ScopeInner {
    id: ScopeId,
    root: ServiceProvider,
    parent: Option<Scope>,
    instances: InstanceCache,
    teardown: Mutex<DisposeBag>,
    overrides: Arc<OverrideLayer>,
}

impl Scope {
    pub(crate) fn new(root: ServiceProvider, parent: Option<Scope>) -> Self {
        let id = ScopeId::next();
        debug!(scope = %id, parent = ?parent.as_ref().map(Scope::id), "scope opened");
        Self {
            inner: Arc::new(ScopeInner {
                id,
                root,
                parent,
                instances: InstanceCache::default(),
                teardown: Mutex::new(DisposeBag::default()),
                overrides: Arc::new(OverrideLayer::default()),
            }),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// Scope this one was opened from, if any.
    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    pub fn provider(&self) -> &ServiceProvider {
        &self.inner.root
    }

    /// Open a child session.
    ///
    /// The child has its own scoped instances and teardown list and sees the
    /// overrides of this scope while they are installed.
    pub fn create_child(&self) -> Scope {
        Scope::new(self.inner.root.clone(), Some(self.clone()))
    }

    pub fn is_closed(&self) -> bool {
        self.inner.teardown.lock().is_sealed()
    }

    pub(crate) fn ensure_open(&self) -> DiResult<()> {
        if self.is_closed() {
            return Err(DiError::ScopeClosed(self.id()));
        }
        Ok(())
    }

    pub(crate) fn instances(&self) -> &InstanceCache {
        &self.inner.instances
    }

    pub(crate) fn overrides(&self) -> &OverrideLayer {
        &self.inner.overrides
    }

    /// Park a release hook; refused once the scope is closed.
    pub(crate) fn track(&self, entry: TeardownEntry) -> Result<(), TeardownEntry> {
        self.inner.teardown.lock().push(entry)
    }

    /// Number of scoped instances built in this session.
    pub fn scoped_count(&self) -> usize {
        self.inner.instances.live_count()
    }

    /// Resolve a capability in this session.
    pub async fn resolve(&self, key: &Key) -> DiResult<AnyArc> {
        resolver::resolve(&self.inner.root, Some(self), key, &ResolutionChain::default()).await
    }

    /// Shadow `key` for this session and its children.
    pub fn with_override(&self, key: Key, lifetime: Lifetime, implementation: Implementation) -> OverrideGuard {
        self.inner
            .overrides
            .install(ServiceDescriptor::new(key, lifetime, implementation))
    }

    /// Shadow the default binding of `T` with a fixed instance.
    pub fn override_instance<T: Send + Sync + 'static>(&self, value: T) -> OverrideGuard {
        self.with_override(key_of_type::<T>(), Lifetime::Transient, Implementation::instance(value))
    }

    /// Shadow the default binding of trait `T` with a fixed trait object.
    pub fn override_trait<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> OverrideGuard {
        self.with_override(key_of_trait::<T>(), Lifetime::Transient, Implementation::trait_instance(value))
    }

    /// Close the session.
    ///
    /// Removes the session's overrides, runs every release hook newest first
    /// and drops the scoped cache. Failing hooks do not stop the others; they
    /// are reported together as [`DiError::Teardown`]. Closing twice is a no-op.
    pub async fn close(&self) -> DiResult<()> {
        let entries = {
            let mut teardown = self.inner.teardown.lock();
            if teardown.is_sealed() {
                return Ok(());
            }
            teardown.seal()
        };
        self.inner.overrides.clear();

        let released = entries.len();
        let failures = release_reverse(entries, Some(self.id())).await;
        self.inner.instances.clear();

        debug!(scope = %self.id(), released, failed = failures.len(), "scope closed");
        self.inner.root.inner().observers.scope_closed(self.id(), failures.len());
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::Teardown(failures))
        }
    }

    /// Run `f` with this scope, then close it.
    ///
    /// The block's result wins over a teardown failure; teardown errors are
    /// only returned when the block succeeded.
    pub async fn using<F, Fut, R, E>(self, f: F) -> Result<R, E>
    where
        F: FnOnce(Scope) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<DiError>,
    {
        let result = f(self.clone()).await;
        let closed = self.close().await;
        let value = result?;
        closed?;
        Ok(value)
    }
}

#[async_trait]
impl ResolverCore for Scope {
    async fn resolve_any(&self, key: &Key) -> DiResult<AnyArc> {
        self.resolve(key).await
    }
}

impl Resolver for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id())
            .field("parent", &self.parent().map(Scope::id))
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        let teardown = self.teardown.get_mut();
        if !teardown.is_sealed() && !teardown.is_empty() && self.root.inner().options.warn_on_undisposed {
            warn!(
                scope = %self.id,
                pending = teardown.len(),
                "scope dropped with instances awaiting release; call close().await before dropping"
            );
        }
    }
}

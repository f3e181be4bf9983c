//! Override layer: temporary bindings that shadow the registry.
//!
//! An override lives on a session (a [`Scope`](crate::Scope) or the provider's
//! ambient layer) and is removed when its [`OverrideGuard`] drops or when the
//! session closes. Overrides for the same key stack; the newest one that is
//! still installed wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::descriptors::{AnyArc, BindingId, ServiceDescriptor};
use crate::key::Key;
use crate::provider::CacheKey;

type Slot = Arc<OnceCell<AnyArc>>;

/// One installed override.
///
/// A singleton-lifetime override keeps its instance here, so the shadowed
/// registry singleton (live or not) is untouched and the override's instance
/// goes away with the override. Registry singletons built on top of overrides
/// are kept here too, in `derived`, so they never reach the provider-wide
/// singleton store.
pub(crate) struct OverrideEntry {
    pub(crate) descriptor: Arc<ServiceDescriptor>,
    pub(crate) singleton: Slot,
    derived: Mutex<HashMap<DerivedKey, Slot>>,
}

/// Identity of a singleton built against a particular set of overrides.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct DerivedKey {
    binding: CacheKey,
    via: Vec<BindingId>,
}

impl DerivedKey {
    pub(crate) fn new(binding: CacheKey, via: &[Arc<OverrideEntry>]) -> Self {
        Self {
            binding,
            via: via.iter().map(|entry| entry.id()).collect(),
        }
    }
}

impl OverrideEntry {
    pub(crate) fn id(&self) -> BindingId {
        self.descriptor.id()
    }

    pub(crate) fn derived_slot(&self, key: DerivedKey) -> Slot {
        self.derived.lock().entry(key).or_default().clone()
    }

    pub(crate) fn peek_derived(&self, key: &DerivedKey) -> Option<AnyArc> {
        self.derived.lock().get(key).and_then(|slot| slot.get().cloned())
    }
}

#[derive(Default)]
pub(crate) struct OverrideLayer {
    stacks: Mutex<HashMap<Key, Vec<Arc<OverrideEntry>>>>,
}

impl OverrideLayer {
    pub(crate) fn install(self: &Arc<Self>, descriptor: ServiceDescriptor) -> OverrideGuard {
        let key = descriptor.key.clone();
        let id = descriptor.id();
        let entry = Arc::new(OverrideEntry {
            descriptor: Arc::new(descriptor),
            singleton: Arc::new(OnceCell::new()),
            derived: Mutex::new(HashMap::new()),
        });
        let depth = {
            let mut stacks = self.stacks.lock();
            let stack = stacks.entry(key.clone()).or_default();
            stack.push(entry);
            stack.len()
        };
        debug!(capability = %key, depth, "override installed");
        OverrideGuard {
            layer: Arc::downgrade(self),
            key,
            id,
        }
    }

    /// Newest override for `key`.
    pub(crate) fn active(&self, key: &Key) -> Option<Arc<OverrideEntry>> {
        self.stacks.lock().get(key).and_then(|stack| stack.last().cloned())
    }

    fn remove(&self, key: &Key, id: BindingId) -> bool {
        let mut stacks = self.stacks.lock();
        let Some(stack) = stacks.get_mut(key) else {
            return false;
        };
        let before = stack.len();
        stack.retain(|entry| entry.id() != id);
        let removed = stack.len() != before;
        if stack.is_empty() {
            stacks.remove(key);
        }
        removed
    }

    fn contains(&self, key: &Key, id: BindingId) -> bool {
        self.stacks
            .lock()
            .get(key)
            .map_or(false, |stack| stack.iter().any(|entry| entry.id() == id))
    }

    /// Whether `entry` is still installed in this layer.
    pub(crate) fn holds(&self, entry: &OverrideEntry) -> bool {
        self.contains(&entry.descriptor.key, entry.id())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.stacks.lock().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.stacks.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.stacks.lock().values().map(Vec::len).sum()
    }
}

/// Handle of an installed override. Dropping it removes the override.
///
/// # Examples
///
/// ```rust
/// use tessera_di::{Resolver, ServiceCollection};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), tessera_di::DiError> {
/// let mut services = ServiceCollection::new();
/// services.add_singleton(String::from("production"));
/// let provider = services.build();
///
/// let scope = provider.create_scope();
/// {
///     let _guard = scope.override_instance(String::from("mock"));
///     assert_eq!(*scope.get::<String>().await?, "mock");
/// }
/// assert_eq!(*scope.get::<String>().await?, "production");
/// scope.close().await?;
/// # Ok(())
/// # }
/// ```
#[must_use = "the override is removed as soon as the guard is dropped"]
pub struct OverrideGuard {
    layer: Weak<OverrideLayer>,
    key: Key,
    id: BindingId,
}

impl OverrideGuard {
    /// Capability the override shadows.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Whether the override is still installed.
    ///
    /// Becomes false once the owning session closes.
    pub fn is_active(&self) -> bool {
        self.layer
            .upgrade()
            .map_or(false, |layer| layer.contains(&self.key, self.id))
    }

    /// Remove the override now.
    pub fn release(self) {}
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        if let Some(layer) = self.layer.upgrade() {
            if layer.remove(&self.key, self.id) {
                debug!(capability = %self.key, "override removed");
            }
        }
    }
}

impl fmt::Debug for OverrideGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideGuard")
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}

//! Obtain-or-create for each lifetime.
//!
//! Singleton and scoped instances live in [`InstanceCache`] slots, one
//! `tokio::sync::OnceCell` per `(Key, BindingId)`. The map of slots is locked
//! only to fetch a slot; construction runs inside the slot's own
//! initialisation, so concurrent requests for one key wait for a single
//! factory run while unrelated keys build in parallel. A cancelled
//! initialisation leaves the slot empty and the next caller builds it.
//!
//! Registry singletons built on top of an override never reach the
//! provider-wide store: they live in the override entry that belongs to the
//! innermost session involved, keyed by every override they were built from.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::descriptors::{AnyArc, BindingId};
use crate::error::{BoxError, DiError, DiResult};
use crate::graph::ConstructionNode;
use crate::internal::{release_one, TeardownEntry};
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::overrides::{DerivedKey, OverrideEntry};

use super::{Dependencies, Scope, ServiceProvider};

/// Cache identity of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    key: Key,
    binding: BindingId,
}

impl CacheKey {
    pub(crate) fn new(key: Key, binding: BindingId) -> Self {
        Self { key, binding }
    }
}

type Slot = Arc<OnceCell<AnyArc>>;

#[derive(Default)]
pub(crate) struct InstanceCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    // constructions currently running, per key
    pending: Mutex<HashMap<Key, usize>>,
}

/// Marks a construction of `key` as running until dropped.
pub(crate) struct Pending<'a> {
    cache: &'a InstanceCache,
    key: Key,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        let mut pending = self.cache.pending.lock();
        if let Some(count) = pending.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                pending.remove(&self.key);
            }
        }
    }
}

impl InstanceCache {
    /// The instance if its slot is initialised.
    pub(crate) fn peek(&self, key: &CacheKey) -> Option<AnyArc> {
        self.slots.lock().get(key).and_then(|slot| slot.get().cloned())
    }

    pub(crate) fn slot(&self, key: CacheKey) -> Slot {
        self.slots.lock().entry(key).or_default().clone()
    }

    /// Whether any binding of `key` has a constructed instance.
    pub(crate) fn has_live(&self, key: &Key) -> bool {
        self.slots
            .lock()
            .iter()
            .any(|(cached, slot)| &cached.key == key && slot.initialized())
    }

    /// Whether a construction of `key` is running right now.
    pub(crate) fn in_flight(&self, key: &Key) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub(crate) fn begin(&self, key: &Key) -> Pending<'_> {
        *self.pending.lock().entry(key.clone()).or_default() += 1;
        Pending {
            cache: self,
            key: key.clone(),
        }
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots.lock().values().filter(|slot| slot.initialized()).count()
    }

    pub(crate) fn clear(&self) {
        self.slots.lock().clear();
    }
}

/// Where a constructed instance's release hook is parked.
enum Owner<'a> {
    Scope(&'a Scope),
    Provider(&'a ServiceProvider),
}

impl Owner<'_> {
    async fn adopt(&self, entry: TeardownEntry) -> DiResult<()> {
        let refused = match self {
            Owner::Scope(scope) => scope.track(entry).err().map(|entry| (entry, DiError::ScopeClosed(scope.id()))),
            Owner::Provider(provider) => provider.track(entry).err().map(|entry| (entry, DiError::Disposed)),
        };
        match refused {
            None => Ok(()),
            Some((entry, error)) => {
                // the owner closed while this instance was being built
                release_one(entry, None).await;
                Err(error)
            }
        }
    }
}

pub(crate) async fn resolve_or_create(
    provider: &ServiceProvider,
    scope: Option<&Scope>,
    node: &ConstructionNode,
    deps: Dependencies,
    chain: &[Key],
) -> DiResult<AnyArc> {
    match node.lifetime() {
        Lifetime::Transient => {
            if scope.is_none() && node.release_hook().is_some() {
                provider.warn_root_transient(node);
            }
            let owner = scope.map_or(Owner::Provider(provider), Owner::Scope);
            build(node, deps, chain, &owner).await
        }
        Lifetime::Scoped => {
            let scope = scope.ok_or_else(|| DiError::NoActiveScope(node.key().clone()))?;
            let slot = scope.instances().slot(node.cache_key());
            let owner = Owner::Scope(scope);
            let instance = slot
                .get_or_try_init(|| async move {
                    scope.ensure_open()?;
                    build(node, deps, chain, &owner).await
                })
                .await?;
            Ok(instance.clone())
        }
        Lifetime::Singleton => {
            let (slot, owner) = match (node.binding().override_entry(), node.overridden_via()) {
                (Some(entry), _) => {
                    let owner = owning_session(scope, std::slice::from_ref(entry))
                        .map_or(Owner::Provider(provider), |(_, owner)| owner);
                    (entry.singleton.clone(), owner)
                }
                (None, via) => match via.first() {
                    None => return registry_singleton(provider, node, deps, chain).await,
                    Some(first) => {
                        let (home, owner) = owning_session(scope, via).unwrap_or((first, Owner::Provider(provider)));
                        (home.derived_slot(DerivedKey::new(node.cache_key(), via)), owner)
                    }
                },
            };
            let instance = slot
                .get_or_try_init(|| async move { build(node, deps, chain, &owner).await })
                .await?;
            Ok(instance.clone())
        }
    }
}

async fn registry_singleton(
    provider: &ServiceProvider,
    node: &ConstructionNode,
    deps: Dependencies,
    chain: &[Key],
) -> DiResult<AnyArc> {
    let singletons = &provider.inner().singletons;
    let slot = singletons.slot(node.cache_key());
    let instance = slot
        .get_or_try_init(|| async move {
            let _pending = singletons.begin(node.key());
            if !provider.is_current(node.descriptor()) {
                return Err(DiError::BindingReplaced(node.key().clone()));
            }
            build(node, deps, chain, &Owner::Provider(provider)).await
        })
        .await?;
    Ok(instance.clone())
}

/// Innermost session, walking up from `scope`, that still holds one of `entries`.
///
/// `None` when none does: the entries are ambient or already removed.
fn owning_session<'a>(
    scope: Option<&'a Scope>,
    entries: &'a [Arc<OverrideEntry>],
) -> Option<(&'a Arc<OverrideEntry>, Owner<'a>)> {
    let mut current = scope;
    while let Some(session) = current {
        if let Some(entry) = entries.iter().find(|entry| session.overrides().holds(entry)) {
            return Some((entry, Owner::Scope(session)));
        }
        current = session.parent();
    }
    None
}

async fn build(node: &ConstructionNode, deps: Dependencies, chain: &[Key], owner: &Owner<'_>) -> DiResult<AnyArc> {
    debug!(capability = %node.key(), lifetime = %node.lifetime(), "constructing");
    let instance = node
        .descriptor()
        .implementation
        .construct(deps)
        .await
        .map_err(|error| construction_failure(node.key(), chain, error))?;

    if let Some(release) = node.release_hook() {
        trace!(capability = %node.key(), "tracking instance for release");
        owner
            .adopt(TeardownEntry {
                key: node.key().clone(),
                instance: instance.clone(),
                release,
            })
            .await?;
    }
    Ok(instance)
}

/// Wrap a factory error, keeping cycles found by nested resolution intact.
fn construction_failure(key: &Key, chain: &[Key], error: BoxError) -> DiError {
    match error.downcast::<DiError>() {
        Ok(inner) => match *inner {
            cycle @ DiError::Circular(_) => cycle,
            other => DiError::Construction {
                key: key.clone(),
                chain: chain.to_vec(),
                source: Arc::new(other),
            },
        },
        Err(other) => DiError::Construction {
            key: key.clone(),
            chain: chain.to_vec(),
            source: Arc::from(other),
        },
    }
}

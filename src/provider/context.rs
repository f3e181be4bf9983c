//! What a factory receives: its built dependencies and a resolver for lazy lookups.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::descriptors::AnyArc;
use crate::error::{DiError, DiResult};
use crate::internal::ResolutionChain;
use crate::key::{key_of_trait, key_of_type, named_key_of_trait, named_key_of_type, Key};
use crate::traits::{downcast_trait, downcast_type, Resolver, ResolverCore};

use super::{resolver, Scope, ServiceProvider};

/// Already-built instances for every requirement a factory declared.
///
/// Lookups only see declared requirements; asking for anything else fails
/// with [`DiError::MissingDependency`]. Use [`Dependencies::resolver`] to
/// resolve a capability lazily instead.
pub struct Dependencies {
    owner: Key,
    resolved: Vec<(Key, AnyArc)>,
    context: ResolverContext,
}

impl Dependencies {
    pub(crate) fn new(owner: Key, resolved: Vec<(Key, AnyArc)>, context: ResolverContext) -> Self {
        Self {
            owner,
            resolved,
            context,
        }
    }

    /// Capability being constructed.
    pub fn owner(&self) -> &Key {
        &self.owner
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        downcast_type::<T>(self.get_by_key(&key_of_type::<T>())?)
    }

    pub fn get_named<T: Send + Sync + 'static>(&self, name: &'static str) -> DiResult<Arc<T>> {
        downcast_type::<T>(self.get_by_key(&named_key_of_type::<T>(name))?)
    }

    pub fn get_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        downcast_trait::<T>(self.get_by_key(&key_of_trait::<T>())?)
    }

    pub fn get_named_trait<T: ?Sized + Send + Sync + 'static>(&self, name: &'static str) -> DiResult<Arc<T>> {
        downcast_trait::<T>(self.get_by_key(&named_key_of_trait::<T>(name))?)
    }

    /// Erased instance of a declared requirement.
    pub fn get_by_key(&self, key: &Key) -> DiResult<AnyArc> {
        self.resolved
            .iter()
            .find(|(declared, _)| declared == key)
            .map(|(_, instance)| instance.clone())
            .ok_or_else(|| DiError::MissingDependency {
                key: key.clone(),
                owner: self.owner.clone(),
            })
    }

    /// Declared requirements, in order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.resolved.iter().map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Resolver for capabilities the factory needs only sometimes.
    ///
    /// It resolves in the same scope session as the current resolution and
    /// reports a cycle if it is asked, directly or indirectly, for a
    /// capability that is still being built.
    pub fn resolver(&self) -> &ResolverContext {
        &self.context
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("owner", &self.owner)
            .field("declared", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolver handed to factories for nested resolution.
#[derive(Clone)]
pub struct ResolverContext {
    provider: ServiceProvider,
    scope: Option<Scope>,
    chain: ResolutionChain,
}

impl ResolverContext {
    pub(crate) fn new(provider: ServiceProvider, scope: Option<Scope>, chain: ResolutionChain) -> Self {
        Self { provider, scope, chain }
    }

    /// Scope session of the resolution that started the factory.
    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn provider(&self) -> &ServiceProvider {
        &self.provider
    }

    /// Capabilities under construction above this factory, outermost first.
    pub fn chain(&self) -> &[Key] {
        self.chain.keys()
    }
}

#[async_trait]
impl ResolverCore for ResolverContext {
    async fn resolve_any(&self, key: &Key) -> DiResult<AnyArc> {
        resolver::resolve(&self.provider, self.scope.as_ref(), key, &self.chain).await
    }
}

impl Resolver for ResolverContext {}

impl fmt::Debug for ResolverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverContext")
            .field("scope", &self.scope.as_ref().map(Scope::id))
            .field("chain", &self.chain.keys())
            .finish()
    }
}

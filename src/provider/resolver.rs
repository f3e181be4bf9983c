//! Resolution: plan, then build node by node in dependency order.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug_span, trace, Instrument};

use crate::descriptors::AnyArc;
use crate::error::{DiError, DiResult};
use crate::graph::{ActiveBinding, BindingSource, ConstructionNode, ConstructionPlan, GraphBuilder};
use crate::internal::ResolutionChain;
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::registration::Registry;

use super::lifetimes::resolve_or_create;
use super::{Dependencies, ProviderInner, ResolverContext, Scope, ServiceProvider};

/// Bindings as seen from one scope: scope overrides (innermost first), then
/// ambient provider overrides, then the registry.
pub(crate) struct ActiveBindings<'a> {
    pub(crate) registry: &'a Registry,
    pub(crate) provider: &'a ProviderInner,
    pub(crate) scope: Option<&'a Scope>,
}

impl BindingSource for ActiveBindings<'_> {
    fn binding(&self, key: &Key) -> Option<ActiveBinding> {
        let mut current = self.scope;
        while let Some(scope) = current {
            if let Some(entry) = scope.overrides().active(key) {
                return Some(ActiveBinding::overridden(entry));
            }
            current = scope.parent();
        }
        if let Some(entry) = self.provider.overrides.active(key) {
            return Some(ActiveBinding::overridden(entry));
        }
        self.registry.get(key).cloned().map(ActiveBinding::registered)
    }

    fn cached(&self, binding: &ActiveBinding) -> Option<AnyArc> {
        match binding.lifetime() {
            Lifetime::Singleton => match binding.override_entry() {
                Some(entry) => entry.singleton.get().cloned(),
                None => self.provider.singletons.peek(&binding.cache_key()),
            },
            Lifetime::Scoped => self
                .scope
                .and_then(|scope| scope.instances().peek(&binding.cache_key())),
            Lifetime::Transient => None,
        }
    }

    fn has_overrides(&self) -> bool {
        let mut current = self.scope;
        while let Some(scope) = current {
            if !scope.overrides().is_empty() {
                return true;
            }
            current = scope.parent();
        }
        !self.provider.overrides.is_empty()
    }
}

pub(crate) async fn resolve(
    provider: &ServiceProvider,
    scope: Option<&Scope>,
    key: &Key,
    chain: &ResolutionChain,
) -> DiResult<AnyArc> {
    if provider.is_disposed() {
        return Err(DiError::Disposed);
    }
    if let Some(scope) = scope {
        scope.ensure_open()?;
    }

    let observers = &provider.inner().observers;
    let started = Instant::now();
    observers.resolving(key);

    let span = debug_span!(
        "resolve",
        capability = %key,
        scope = scope.map(|scope| scope.id().get()),
        depth = chain.depth(),
    );
    let result = execute(provider, scope, key, chain).instrument(span).await;

    match &result {
        Ok(_) => observers.resolved(key, started.elapsed()),
        Err(error) => observers.failed(key, error),
    }
    result
}

async fn execute(
    provider: &ServiceProvider,
    scope: Option<&Scope>,
    key: &Key,
    chain: &ResolutionChain,
) -> DiResult<AnyArc> {
    let plan = plan(provider, key, scope, chain)?;

    if scope.is_none() {
        if let Some(node) = plan
            .iter()
            .find(|node| node.requires_build() && node.lifetime() == Lifetime::Scoped)
        {
            return Err(DiError::NoActiveScope(node.key().clone()));
        }
    }

    trace!(nodes = plan.len(), pending = plan.pending(), "executing construction plan");
    let mut built: HashMap<Key, AnyArc> = HashMap::with_capacity(plan.len());
    for (index, node) in plan.iter().enumerate() {
        let instance = match node.cached() {
            Some(instance) => {
                trace!(capability = %node.key(), "cache hit");
                instance.clone()
            }
            None => {
                let path = plan.chain_to(index);
                let deps = gather(provider, scope, chain, node, &built, &path)?;
                resolve_or_create(provider, scope, node, deps, &path).await?
            }
        };
        built.insert(node.key().clone(), instance);
    }

    built.remove(key).ok_or_else(|| DiError::NotFound {
        key: key.clone(),
        requested_by: None,
    })
}

fn gather(
    provider: &ServiceProvider,
    scope: Option<&Scope>,
    chain: &ResolutionChain,
    node: &ConstructionNode,
    built: &HashMap<Key, AnyArc>,
    path: &[Key],
) -> DiResult<Dependencies> {
    let resolved = node
        .dependencies()
        .iter()
        .map(|dependency| {
            built
                .get(dependency)
                .map(|instance| (dependency.clone(), instance.clone()))
                .ok_or_else(|| DiError::MissingDependency {
                    key: dependency.clone(),
                    owner: node.key().clone(),
                })
        })
        .collect::<DiResult<Vec<_>>>()?;
    let context = ResolverContext::new(provider.clone(), scope.cloned(), chain.extend(path));
    Ok(Dependencies::new(node.key().clone(), resolved, context))
}

/// Plan `key` as seen from `scope`, treating `chain` as already under construction.
pub(crate) fn plan(
    provider: &ServiceProvider,
    key: &Key,
    scope: Option<&Scope>,
    chain: &ResolutionChain,
) -> DiResult<ConstructionPlan> {
    let inner = provider.inner();
    let registry = inner.registry.read();
    let introspector = inner.introspector.read().clone();
    let source = ActiveBindings {
        registry: &registry,
        provider: inner,
        scope,
    };
    GraphBuilder::new(&source, introspector.as_ref())
        .with_max_depth(inner.options.max_depth)
        .with_ancestors(chain.keys().iter().cloned())
        .plan(key)
}

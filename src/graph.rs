//! Construction planning.
//!
//! [`GraphBuilder::plan`] expands a requested capability into a
//! [`ConstructionPlan`]: every reachable capability exactly once, dependencies
//! strictly before their dependents, the requested root last. Planning is
//! depth-first over an explicit frame stack with three-colour marking, so
//! cycles, missing bindings and lifetime violations are all reported before a
//! single factory runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::descriptors::{AnyArc, ReleaseFn, ServiceDescriptor};
use crate::error::{DiError, DiResult};
use crate::internal::MAX_DEPTH;
use crate::introspect::DependencyIntrospector;
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::overrides::{DerivedKey, OverrideEntry};
use crate::provider::CacheKey;

/// Where the graph builder finds bindings and already-live instances.
pub trait BindingSource {
    /// The binding that is active for `key`, overrides included.
    fn binding(&self, key: &Key) -> Option<ActiveBinding>;

    /// An instance already cached for the binding, if any.
    ///
    /// Cached nodes are not expanded further: their dependencies were built
    /// when they were.
    fn cached(&self, _binding: &ActiveBinding) -> Option<AnyArc> {
        None
    }

    /// Whether any override is visible from this source.
    ///
    /// While one is, registry singletons are expanded before their cache is
    /// consulted, since their dependencies may be shadowed.
    fn has_overrides(&self) -> bool {
        false
    }
}

/// The descriptor a key currently resolves to.
#[derive(Clone)]
pub struct ActiveBinding {
    descriptor: Arc<ServiceDescriptor>,
    override_entry: Option<Arc<OverrideEntry>>,
}

impl ActiveBinding {
    /// A binding straight from the registry.
    pub fn registered(descriptor: Arc<ServiceDescriptor>) -> Self {
        Self {
            descriptor,
            override_entry: None,
        }
    }

    pub(crate) fn overridden(entry: Arc<OverrideEntry>) -> Self {
        Self {
            descriptor: entry.descriptor.clone(),
            override_entry: Some(entry),
        }
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn lifetime(&self) -> Lifetime {
        self.descriptor.lifetime
    }

    /// Whether an override shadows the registry for this key.
    pub fn is_override(&self) -> bool {
        self.override_entry.is_some()
    }

    pub(crate) fn override_entry(&self) -> Option<&Arc<OverrideEntry>> {
        self.override_entry.as_ref()
    }

    pub(crate) fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.descriptor.key.clone(), self.descriptor.id())
    }
}

impl fmt::Debug for ActiveBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveBinding")
            .field("key", &self.descriptor.key)
            .field("lifetime", &self.descriptor.lifetime)
            .field("override", &self.is_override())
            .finish()
    }
}

/// Colour of a node during planning.
///
/// Keys the builder has not reached yet are `Unvisited`; a node is
/// `InProgress` while its dependencies are being expanded and `Done` once it
/// has been placed in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitState {
    Unvisited,
    InProgress,
    Done,
}

/// One capability in a construction plan.
#[derive(Clone)]
pub struct ConstructionNode {
    key: Key,
    binding: ActiveBinding,
    dependencies: Vec<Key>,
    state: VisitState,
    cached: Option<AnyArc>,
    requested_by: Option<Key>,
    // first scoped key this node (transitively) needs, if any
    scoped_via: Option<Key>,
    // overrides this node (transitively) is built from, ordered by id
    overridden_via: Vec<Arc<OverrideEntry>>,
}

impl ConstructionNode {
    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn binding(&self) -> &ActiveBinding {
        &self.binding
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        self.binding.descriptor()
    }

    pub fn lifetime(&self) -> Lifetime {
        self.binding.lifetime()
    }

    /// Direct dependencies, in the order the factory receives them.
    pub fn dependencies(&self) -> &[Key] {
        &self.dependencies
    }

    pub fn state(&self) -> VisitState {
        self.state
    }

    /// Node that first pulled this one into the plan; `None` for the root.
    pub fn requested_by(&self) -> Option<&Key> {
        self.requested_by.as_ref()
    }

    pub fn cached(&self) -> Option<&AnyArc> {
        self.cached.as_ref()
    }

    /// Whether executing the plan runs this node's factory (or cache slot).
    pub fn requires_build(&self) -> bool {
        self.cached.is_none()
    }

    /// Whether the node can only be built inside a scope session.
    pub fn needs_scope(&self) -> bool {
        self.scoped_via.is_some()
    }

    /// Whether the node is, or is built from, an override.
    pub fn depends_on_override(&self) -> bool {
        !self.overridden_via.is_empty()
    }

    pub(crate) fn overridden_via(&self) -> &[Arc<OverrideEntry>] {
        &self.overridden_via
    }

    pub(crate) fn release_hook(&self) -> Option<Arc<ReleaseFn>> {
        self.descriptor().implementation.release_hook()
    }

    pub(crate) fn cache_key(&self) -> CacheKey {
        self.binding.cache_key()
    }
}

impl fmt::Debug for ConstructionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructionNode")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime())
            .field("dependencies", &self.dependencies)
            .field("state", &self.state)
            .field("cached", &self.cached.is_some())
            .finish()
    }
}

/// Topologically ordered construction plan; the root is the last node.
#[derive(Debug, Clone)]
pub struct ConstructionPlan {
    nodes: Vec<ConstructionNode>,
    positions: HashMap<Key, usize>,
}

impl ConstructionPlan {
    fn new(nodes: Vec<ConstructionNode>) -> Self {
        let positions = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.key.clone(), index))
            .collect();
        Self { nodes, positions }
    }

    /// The requested capability.
    pub fn root(&self) -> Option<&ConstructionNode> {
        self.nodes.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConstructionNode> {
        self.nodes.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ConstructionNode> {
        self.nodes.get(index)
    }

    /// Keys in construction order.
    pub fn keys(&self) -> Vec<&Key> {
        self.nodes.iter().map(|node| &node.key).collect()
    }

    pub fn position(&self, key: &Key) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes whose factory or cache slot runs when executing the plan.
    pub fn pending(&self) -> usize {
        self.nodes.iter().filter(|node| node.requires_build()).count()
    }

    /// Path from the root down to the node at `index`, both ends included.
    pub fn chain_to(&self, index: usize) -> Vec<Key> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(index);
        while let Some(node) = current {
            chain.push(node.key.clone());
            current = node
                .requested_by
                .as_ref()
                .and_then(|parent| self.position(parent))
                .and_then(|position| self.nodes.get(position));
            if chain.len() > self.nodes.len() {
                break;
            }
        }
        chain.reverse();
        chain
    }
}

/// Expands a capability into a [`ConstructionPlan`].
pub struct GraphBuilder<'a> {
    source: &'a dyn BindingSource,
    introspector: &'a dyn DependencyIntrospector,
    ancestors: Vec<Key>,
    max_depth: usize,
    overrides_visible: bool,
}

struct Frame {
    node: usize,
    next_dependency: usize,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(source: &'a dyn BindingSource, introspector: &'a dyn DependencyIntrospector) -> Self {
        Self {
            source,
            introspector,
            ancestors: Vec::new(),
            max_depth: MAX_DEPTH,
            overrides_visible: source.has_overrides(),
        }
    }

    /// Bound on ancestor chain length plus plan depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Capabilities already under construction further up a nested resolution.
    ///
    /// Reaching one of them from this plan is a cycle.
    pub fn with_ancestors(mut self, ancestors: impl IntoIterator<Item = Key>) -> Self {
        self.ancestors = ancestors.into_iter().collect();
        self
    }

    pub fn plan(&self, root: &Key) -> DiResult<ConstructionPlan> {
        let mut arena: Vec<ConstructionNode> = Vec::new();
        let mut index: HashMap<Key, usize> = HashMap::new();
        let mut requirements: HashMap<usize, Vec<Key>> = HashMap::new();
        let mut order: Vec<usize> = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();

        self.check_ancestors(root, &stack, &arena)?;
        let root_node = self.enter(root, None, 0, &mut arena, &mut index, &mut requirements)?;
        stack.push(Frame {
            node: root_node,
            next_dependency: 0,
        });

        while let Some(frame) = stack.last_mut() {
            let current = frame.node;
            let Some(dependency) = arena[current].dependencies.get(frame.next_dependency).cloned() else {
                self.finish(current, &mut arena, &index)?;
                order.push(current);
                stack.pop();
                continue;
            };
            frame.next_dependency += 1;

            match index.get(&dependency).map(|&found| (found, arena[found].state)) {
                Some((_, VisitState::Done)) => {}
                Some((found, _)) => {
                    let mut path: Vec<Key> = stack
                        .iter()
                        .skip_while(|frame| frame.node != found)
                        .map(|frame| arena[frame.node].key.clone())
                        .collect();
                    path.push(dependency);
                    return Err(DiError::Circular(path));
                }
                None => {
                    self.check_ancestors(&dependency, &stack, &arena)?;
                    let requester = arena[current].key.clone();
                    let depth = stack.len();
                    let node = self.enter(
                        &dependency,
                        Some(requester),
                        depth,
                        &mut arena,
                        &mut index,
                        &mut requirements,
                    )?;
                    stack.push(Frame {
                        node,
                        next_dependency: 0,
                    });
                }
            }
        }

        // nodes only reachable through a cache hit found in `finish` are dropped
        let mut needed = vec![false; arena.len()];
        needed[root_node] = true;
        for &position in order.iter().rev() {
            if !needed[position] {
                continue;
            }
            for dependency in &arena[position].dependencies {
                if let Some(&found) = index.get(dependency) {
                    needed[found] = true;
                }
            }
        }

        let mut slots: Vec<Option<ConstructionNode>> = arena.into_iter().map(Some).collect();
        let nodes = order
            .into_iter()
            .filter(|&position| needed[position])
            .filter_map(|position| slots.get_mut(position).and_then(Option::take))
            .collect();
        Ok(ConstructionPlan::new(nodes))
    }

    /// State of `key` in a plan under construction.
    fn state_of(key: &Key, arena: &[ConstructionNode], index: &HashMap<Key, usize>) -> VisitState {
        index
            .get(key)
            .map_or(VisitState::Unvisited, |&position| arena[position].state)
    }

    fn check_ancestors(&self, key: &Key, stack: &[Frame], arena: &[ConstructionNode]) -> DiResult<()> {
        let Some(start) = self.ancestors.iter().position(|ancestor| ancestor == key) else {
            return Ok(());
        };
        let mut path = self.ancestors[start..].to_vec();
        path.extend(stack.iter().map(|frame| arena[frame.node].key.clone()));
        path.push(key.clone());
        Err(DiError::Circular(path))
    }

    fn enter(
        &self,
        key: &Key,
        requested_by: Option<Key>,
        depth: usize,
        arena: &mut Vec<ConstructionNode>,
        index: &mut HashMap<Key, usize>,
        requirements: &mut HashMap<usize, Vec<Key>>,
    ) -> DiResult<usize> {
        let total_depth = self.ancestors.len() + depth;
        if total_depth >= self.max_depth {
            return Err(DiError::DepthExceeded(total_depth));
        }

        let binding = self.source.binding(key).ok_or_else(|| DiError::NotFound {
            key: key.clone(),
            requested_by: requested_by.clone(),
        })?;
        let cached = if self.defers_cache(&binding) {
            None
        } else {
            self.source.cached(&binding)
        };
        let dependencies = match cached {
            Some(_) => Vec::new(),
            None => {
                let implementation = &binding.descriptor().implementation;
                requirements
                    .entry(implementation.identity())
                    .or_insert_with(|| self.introspector.requirements_of(implementation))
                    .clone()
            }
        };

        let position = arena.len();
        arena.push(ConstructionNode {
            key: key.clone(),
            binding,
            dependencies,
            state: VisitState::InProgress,
            cached,
            requested_by,
            scoped_via: None,
            overridden_via: Vec::new(),
        });
        index.insert(key.clone(), position);
        Ok(position)
    }

    fn defers_cache(&self, binding: &ActiveBinding) -> bool {
        self.overrides_visible && !binding.is_override() && binding.lifetime() == Lifetime::Singleton
    }

    fn finish(
        &self,
        position: usize,
        arena: &mut [ConstructionNode],
        index: &HashMap<Key, usize>,
    ) -> DiResult<()> {
        let node = &arena[position];
        debug_assert_eq!(Self::state_of(&node.key, arena, index), VisitState::InProgress);

        let inherited = node.dependencies.iter().find_map(|dependency| {
            index
                .get(dependency)
                .and_then(|&found| arena[found].scoped_via.clone())
        });
        let scoped_via = match node.lifetime() {
            Lifetime::Scoped => Some(node.key.clone()),
            Lifetime::Transient => inherited,
            Lifetime::Singleton => {
                if let Some(scoped) = inherited {
                    return Err(DiError::CaptiveDependency {
                        singleton: node.key.clone(),
                        scoped,
                    });
                }
                None
            }
        };

        let mut overridden_via: Vec<Arc<OverrideEntry>> = node.binding.override_entry().cloned().into_iter().collect();
        for dependency in &node.dependencies {
            if let Some(&found) = index.get(dependency) {
                overridden_via.extend(arena[found].overridden_via.iter().cloned());
            }
        }
        overridden_via.sort_by_key(|entry| entry.id());
        overridden_via.dedup_by_key(|entry| entry.id());

        let cached = if node.cached.is_none() && self.defers_cache(&node.binding) {
            match overridden_via.as_slice() {
                [] => self.source.cached(&node.binding),
                via => {
                    let derived = DerivedKey::new(node.cache_key(), via);
                    via.iter().find_map(|entry| entry.peek_derived(&derived))
                }
            }
        } else {
            None
        };

        let node = &mut arena[position];
        if cached.is_some() {
            node.cached = cached;
            node.dependencies.clear();
        }
        node.scoped_via = scoped_via;
        node.overridden_via = overridden_via;
        node.state = VisitState::Done;
        Ok(())
    }
}

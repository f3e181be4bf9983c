//! Binding registry: capability keys mapped to service descriptors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::descriptors::{Implementation, ServiceDescriptor};
use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::lifetime::Lifetime;

/// Store of bindings and aliases.
///
/// Registration is last-write-wins: binding a key again replaces the earlier
/// descriptor. The provider layers its own rule on top (a live singleton may
/// not be rebound), the registry itself never refuses a binding.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    bindings: HashMap<Key, Arc<ServiceDescriptor>>,
    // registration order, for diagnostics and validation
    order: Vec<Key>,
    aliases: HashMap<String, Key>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key`, replacing any earlier binding for it.
    pub fn register(
        &mut self,
        key: Key,
        lifetime: Lifetime,
        implementation: Implementation,
    ) -> Arc<ServiceDescriptor> {
        let descriptor = Arc::new(ServiceDescriptor::new(key.clone(), lifetime, implementation));
        if self.bindings.insert(key.clone(), descriptor.clone()).is_some() {
            trace!(capability = %key, %lifetime, "replaced existing binding");
        } else {
            trace!(capability = %key, %lifetime, "registered binding");
            self.order.push(key);
        }
        descriptor
    }

    /// The descriptor bound to `key`.
    pub fn lookup(&self, key: &Key) -> DiResult<Arc<ServiceDescriptor>> {
        self.get(key).cloned().ok_or_else(|| DiError::NotFound {
            key: key.clone(),
            requested_by: None,
        })
    }

    pub fn get(&self, key: &Key) -> Option<&Arc<ServiceDescriptor>> {
        self.bindings.get(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.bindings.contains_key(key)
    }

    /// The default binding and every named binding of the same capability.
    pub fn bindings_for(&self, key: &Key) -> Vec<Arc<ServiceDescriptor>> {
        let base = key.unnamed();
        self.iter()
            .filter(|descriptor| descriptor.key.unnamed() == base)
            .cloned()
            .collect()
    }

    /// Point `alias` at `key`. An alias cannot be redefined.
    pub fn add_alias(&mut self, alias: impl Into<String>, key: Key) -> DiResult<()> {
        let alias = alias.into();
        if let Some(existing) = self.aliases.get(&alias) {
            if *existing == key {
                return Ok(());
            }
            return Err(DiError::AliasAlreadyDefined(alias));
        }
        trace!(%alias, capability = %key, "registered alias");
        self.aliases.insert(alias, key);
        Ok(())
    }

    /// Key an alias points at.
    pub fn alias(&self, alias: &str) -> DiResult<&Key> {
        self.aliases
            .get(alias)
            .ok_or_else(|| DiError::UnknownAlias(alias.to_string()))
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ServiceDescriptor>> {
        self.order.iter().filter_map(|key| self.bindings.get(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

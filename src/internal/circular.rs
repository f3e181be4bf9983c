//! Resolution chain carried into nested (lazy) resolutions.
//!
//! A factory that resolves more services while it runs starts a new plan. The
//! chain records every capability between the outermost request and that
//! factory, so the nested plan can report a cycle instead of waiting forever
//! on an instance that is still being built.

use std::sync::Arc;

use crate::key::Key;

/// Default bound on chain length plus plan depth.
pub(crate) const MAX_DEPTH: usize = 1024;

#[derive(Debug, Clone, Default)]
pub(crate) struct ResolutionChain {
    keys: Arc<Vec<Key>>,
}

impl ResolutionChain {
    /// The chain seen by a factory whose plan path is `path`.
    pub(crate) fn extend(&self, path: &[Key]) -> Self {
        let mut keys = Vec::with_capacity(self.keys.len() + path.len());
        keys.extend(self.keys.iter().cloned());
        keys.extend(path.iter().cloned());
        Self { keys: Arc::new(keys) }
    }

    pub(crate) fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub(crate) fn depth(&self) -> usize {
        self.keys.len()
    }
}

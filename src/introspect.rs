//! Dependency introspection seam.
//!
//! The graph builder never inspects factories itself. It asks a
//! [`DependencyIntrospector`] for the ordered requirement list of each
//! implementation, once per distinct implementation per plan, and does not keep
//! the answer beyond that plan. Replacing the introspector on a live provider
//! therefore takes effect on the next resolution.

use crate::descriptors::Implementation;
use crate::key::Key;

/// Source of the ordered requirement list of an implementation.
pub trait DependencyIntrospector: Send + Sync {
    fn requirements_of(&self, implementation: &Implementation) -> Vec<Key>;
}

/// Reports the requirements declared at registration.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredDependencies;

impl DependencyIntrospector for DeclaredDependencies {
    fn requirements_of(&self, implementation: &Implementation) -> Vec<Key> {
        implementation.requires().to_vec()
    }
}

impl<F> DependencyIntrospector for F
where
    F: Fn(&Implementation) -> Vec<Key> + Send + Sync,
{
    fn requirements_of(&self, implementation: &Implementation) -> Vec<Key> {
        self(implementation)
    }
}

//! Service lifetime definitions.

use std::fmt;

/// Lifetime policy attached to every binding.
///
/// The lifetime decides where a constructed instance is cached and who
/// releases it:
///
/// - **Singleton**: one instance per provider, released by
///   [`ServiceProvider::dispose_all`](crate::ServiceProvider::dispose_all)
/// - **Scoped**: one instance per scope session, released when the scope closes
/// - **Transient**: a fresh instance for every resolution, never cached
///
/// A singleton may not depend on a scoped service; the graph builder rejects
/// such a plan with [`DiError::CaptiveDependency`](crate::DiError::CaptiveDependency).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
pub enum Lifetime {
    /// Single instance per provider, constructed at most once
    Singleton,
    /// Single instance per scope session
    Scoped,
    /// New instance per resolution
    Transient,
}

impl Lifetime {
    /// Whether instances of this lifetime are kept in a cache.
    pub fn is_cached(self) -> bool {
        !matches!(self, Lifetime::Transient)
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped => "scoped",
            Lifetime::Transient => "transient",
        };
        f.write_str(name)
    }
}

//! Error types for the dependency injection container.

use std::fmt::Write as _;
use std::sync::Arc;

use thiserror::Error;

use crate::key::Key;
use crate::provider::ScopeId;

/// Boxed error returned by factories and release hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared error used as the source of [`DiError`] variants so the enum stays `Clone`.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Dependency injection errors
///
/// Planning errors (`NotFound`, `Circular`, `CaptiveDependency`,
/// `DepthExceeded`, `NoActiveScope`) are raised before any factory runs, so a
/// failed plan never leaves partially constructed instances behind.
///
/// # Examples
///
/// ```rust
/// use tessera_di::{key_of_type, DiError};
///
/// struct Repository;
/// struct Database;
///
/// let err = DiError::NotFound {
///     key: key_of_type::<Database>(),
///     requested_by: Some(key_of_type::<Repository>()),
/// };
/// assert!(err.to_string().starts_with("Service not found"));
/// assert!(err.is_planning_error());
/// ```
#[derive(Debug, Clone, Error)]
pub enum DiError {
    /// No binding (registered or overridden) for the capability
    #[error("Service not found: {key}{}", requester(.requested_by))]
    NotFound {
        key: Key,
        requested_by: Option<Key>,
    },

    /// Circular dependency detected; the path starts and ends with the same key
    #[error("Circular dependency: {}", path(.0))]
    Circular(Vec<Key>),

    /// A scoped service was requested without a scope session
    #[error("No active scope to resolve scoped service: {0}")]
    NoActiveScope(Key),

    /// The scope session has already been closed
    #[error("Scope {0} is closed")]
    ScopeClosed(ScopeId),

    /// A factory failed; `chain` runs from the requested root to the failing key
    #[error("Failed to construct {key} (via {}): {source}", path(.chain))]
    Construction {
        key: Key,
        chain: Vec<Key>,
        #[source]
        source: SharedError,
    },

    /// One or more release hooks failed; every instance still got a release attempt
    #[error("Teardown failed for {} instance(s): {}", .0.len(), teardown_summary(.0))]
    Teardown(Vec<TeardownError>),

    /// Type downcast failed
    #[error("Type mismatch for: {0}")]
    TypeMismatch(&'static str),

    /// A singleton would capture an instance that lives in a single scope
    #[error("Lifetime error: singleton {singleton} cannot depend on scoped service {scoped}")]
    CaptiveDependency { singleton: Key, scoped: Key },

    /// Rebinding refused because the singleton for the key is already live
    #[error("Cannot rebind {0}: its singleton instance has already been constructed")]
    LiveSingleton(Key),

    /// The binding a resolution planned with was replaced before its singleton was built
    #[error("Binding for {0} was replaced while it was being resolved")]
    BindingReplaced(Key),

    /// A factory asked for an instance it did not declare as a requirement
    #[error("{owner} requested {key}, which is not among its declared dependencies")]
    MissingDependency { key: Key, owner: Key },

    /// Maximum resolution depth exceeded
    #[error("Max depth {0} exceeded")]
    DepthExceeded(usize),

    /// No capability is registered under the alias
    #[error("Unknown alias: {0}")]
    UnknownAlias(String),

    /// The alias already points at another capability
    #[error("Alias already defined: {0}")]
    AliasAlreadyDefined(String),

    /// The provider has been disposed
    #[error("Service provider has been disposed")]
    Disposed,

    /// Container options could not be read
    #[error("Invalid container options: {0}")]
    InvalidOptions(String),

    /// Whole-registry validation found problems
    #[error("Container validation failed with {} error(s)", .0.len())]
    Validation(Vec<DiError>),
}

impl DiError {
    /// Whether the error was raised while planning, before any construction.
    pub fn is_planning_error(&self) -> bool {
        matches!(
            self,
            DiError::NotFound { .. }
                | DiError::Circular(_)
                | DiError::NoActiveScope(_)
                | DiError::CaptiveDependency { .. }
                | DiError::DepthExceeded(_)
        )
    }

    /// The capability the error is about, when there is a single one.
    pub fn key(&self) -> Option<&Key> {
        match self {
            DiError::NotFound { key, .. }
            | DiError::NoActiveScope(key)
            | DiError::Construction { key, .. }
            | DiError::LiveSingleton(key)
            | DiError::BindingReplaced(key)
            | DiError::MissingDependency { key, .. } => Some(key),
            DiError::CaptiveDependency { singleton, .. } => Some(singleton),
            _ => None,
        }
    }
}

/// A release hook that failed during scope close or provider disposal.
#[derive(Debug, Clone, Error)]
#[error("{key}: {source}")]
pub struct TeardownError {
    /// Capability whose instance failed to release
    pub key: Key,
    /// Scope that owned the instance, `None` for provider-owned instances
    pub scope: Option<ScopeId>,
    #[source]
    pub source: SharedError,
}

fn requester(requested_by: &Option<Key>) -> String {
    match requested_by {
        Some(key) => format!(" (required by {key})"),
        None => String::new(),
    }
}

fn path(keys: &[Key]) -> String {
    let mut out = String::new();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push_str(" -> ");
        }
        let _ = write!(out, "{key}");
    }
    out
}

fn teardown_summary(failures: &[TeardownError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for DI operations
pub type DiResult<T> = Result<T, DiError>;

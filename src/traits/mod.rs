//! Core traits for the dependency injection container.

mod dispose;
mod resolver;

pub use dispose::{AsyncDispose, Dispose};
pub(crate) use resolver::{downcast_trait, downcast_type};
pub use resolver::{Resolver, ResolverCore};

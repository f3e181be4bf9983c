//! Resolver traits for service resolution.

use std::any::type_name;
use std::sync::Arc;

use async_trait::async_trait;

use crate::descriptors::AnyArc;
use crate::error::{DiError, DiResult};
use crate::key::{key_of_trait, key_of_type, named_key_of_trait, named_key_of_type, Key};

/// Type-erased resolution, implemented by every resolution entry point.
#[async_trait]
pub trait ResolverCore: Send + Sync {
    /// Resolve the capability and return the erased instance.
    async fn resolve_any(&self, key: &Key) -> DiResult<AnyArc>;
}

/// Typed resolution on top of [`ResolverCore`].
///
/// Implemented by [`ServiceProvider`](crate::ServiceProvider) (root resolution),
/// [`Scope`](crate::Scope) (resolution inside a scope session) and
/// [`ResolverContext`](crate::ResolverContext) (lazy resolution from inside a
/// factory).
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use tessera_di::{Resolver, ServiceCollection};
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".to_string()
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), tessera_di::DiError> {
/// let mut services = ServiceCollection::new();
/// services.add_singleton(42u32);
/// services.add_named_singleton("port", 8080u16);
/// services.add_singleton_trait(Arc::new(English) as Arc<dyn Greeter>);
/// let provider = services.build();
///
/// assert_eq!(*provider.get::<u32>().await?, 42);
/// assert_eq!(*provider.get_named::<u16>("port").await?, 8080);
/// assert_eq!(provider.get_trait::<dyn Greeter>().await?.greet(), "hello");
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Resolver: ResolverCore {
    /// Resolve the default binding of a concrete type.
    async fn get<T>(&self) -> DiResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let any = self.resolve_any(&key_of_type::<T>()).await?;
        downcast_type::<T>(any)
    }

    /// Resolve a named binding of a concrete type.
    async fn get_named<T>(&self, name: &'static str) -> DiResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let any = self.resolve_any(&named_key_of_type::<T>(name)).await?;
        downcast_type::<T>(any)
    }

    /// Resolve the default binding of a trait object type.
    async fn get_trait<T>(&self) -> DiResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let any = self.resolve_any(&key_of_trait::<T>()).await?;
        downcast_trait::<T>(any)
    }

    /// Resolve a named binding of a trait object type.
    async fn get_named_trait<T>(&self, name: &'static str) -> DiResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let any = self.resolve_any(&named_key_of_trait::<T>(name)).await?;
        downcast_trait::<T>(any)
    }
}

pub(crate) fn downcast_type<T: Send + Sync + 'static>(any: AnyArc) -> DiResult<Arc<T>> {
    any.downcast::<T>()
        .map_err(|_| DiError::TypeMismatch(type_name::<T>()))
}

// Trait instances are stored as Arc<Arc<dyn Trait>>
pub(crate) fn downcast_trait<T: ?Sized + Send + Sync + 'static>(any: AnyArc) -> DiResult<Arc<T>> {
    any.downcast::<Arc<T>>()
        .map(|boxed| (*boxed).clone())
        .map_err(|_| DiError::TypeMismatch(type_name::<T>()))
}

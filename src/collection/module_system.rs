//! Service modules: reusable groups of registrations.

use crate::error::DiResult;

use super::ServiceCollection;

/// A group of registrations applied to a [`ServiceCollection`] in one call.
///
/// # Example
///
/// ```rust
/// use tessera_di::{keys, DiResult, Resolver, ServiceCollection, ServiceCollectionExt, ServiceModule};
///
/// struct UserConfig {
///     max_sessions: usize,
/// }
///
/// struct UserService {
///     limit: usize,
/// }
///
/// struct UserModule;
///
/// impl ServiceModule for UserModule {
///     fn register_services(self, services: &mut ServiceCollection) -> DiResult<()> {
///         services.add_singleton(UserConfig { max_sessions: 4 });
///         services.add_scoped_factory::<UserService, _>(keys![UserConfig], |deps| {
///             Ok(UserService { limit: deps.get::<UserConfig>()?.max_sessions })
///         });
///         services.add_alias("users", tessera_di::key_of_type::<UserService>())?;
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> DiResult<()> {
/// let provider = ServiceCollection::new().add_module(UserModule)?.build();
/// let scope = provider.create_scope();
/// assert_eq!(scope.get::<UserService>().await?.limit, 4);
/// scope.close().await?;
/// # Ok(())
/// # }
/// ```
pub trait ServiceModule {
    /// Register this module's services.
    fn register_services(self, services: &mut ServiceCollection) -> DiResult<()>;
}

/// Chaining module registration on an owned collection.
pub trait ServiceCollectionExt {
    fn add_module<M: ServiceModule>(self, module: M) -> DiResult<Self>
    where
        Self: Sized;
}

impl ServiceCollectionExt for ServiceCollection {
    fn add_module<M: ServiceModule>(mut self, module: M) -> DiResult<Self> {
        module.register_services(&mut self)?;
        Ok(self)
    }
}

/// Module registration on a borrowed collection.
pub trait ServiceCollectionModuleExt {
    fn add_module_mut<M: ServiceModule>(&mut self, module: M) -> DiResult<&mut Self>;
}

impl ServiceCollectionModuleExt for ServiceCollection {
    fn add_module_mut<M: ServiceModule>(&mut self, module: M) -> DiResult<&mut Self> {
        module.register_services(self)?;
        Ok(self)
    }
}

//! Service collection: the registration front-end.
//!
//! A [`ServiceCollection`] gathers bindings, aliases, observers and options and
//! turns them into a [`ServiceProvider`]. Every `add_*` method is sugar over
//! [`ServiceCollection::register`].

use std::future::Future;
use std::sync::Arc;

use crate::config::ContainerOptions;
use crate::descriptors::{Implementation, ServiceDescriptor};
use crate::error::{BoxError, DiResult};
use crate::introspect::{DeclaredDependencies, DependencyIntrospector};
use crate::key::{key_of_trait, key_of_type, named_key_of_trait, named_key_of_type, Key};
use crate::lifetime::Lifetime;
use crate::observer::{DiObserver, Observers};
use crate::provider::{Dependencies, ServiceProvider};
use crate::registration::Registry;
use crate::validation::{validate_registry, ValidationReport};

pub mod module_system;
pub use module_system::*;

/// Builder for a [`ServiceProvider`].
pub struct ServiceCollection {
    registry: Registry,
    observers: Observers,
    options: ContainerOptions,
    introspector: Arc<dyn DependencyIntrospector>,
}

impl Default for ServiceCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            observers: Observers::default(),
            options: ContainerOptions::default(),
            introspector: Arc::new(DeclaredDependencies),
        }
    }

    /// Bind `key` to `implementation`; a later binding of the same key wins.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tessera_di::{key_of_type, Implementation, Lifetime, ServiceCollection};
    ///
    /// struct Pool;
    ///
    /// let mut services = ServiceCollection::new();
    /// services.register(
    ///     key_of_type::<Pool>(),
    ///     Lifetime::Singleton,
    ///     Implementation::factory::<Pool, _>(vec![], |_| Ok(Pool))
    ///         .on_release(|_| async { Ok(()) }),
    /// );
    /// assert!(services.contains(&key_of_type::<Pool>()));
    /// ```
    pub fn register(&mut self, key: Key, lifetime: Lifetime, implementation: Implementation) -> &mut Self {
        self.registry.register(key, lifetime, implementation);
        self
    }

    // ----- Concrete types -----

    /// Bind a pre-built value, shared by every resolution.
    ///
    /// ```rust
    /// # use tessera_di::ServiceCollection;
    /// struct Config {
    ///     database_url: String,
    /// }
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_singleton(Config {
    ///     database_url: "postgres://localhost".to_string(),
    /// });
    /// ```
    pub fn add_singleton<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.register(key_of_type::<T>(), Lifetime::Singleton, Implementation::instance(value))
    }

    pub fn add_named_singleton<T: Send + Sync + 'static>(&mut self, name: &'static str, value: T) -> &mut Self {
        self.register(
            named_key_of_type::<T>(name),
            Lifetime::Singleton,
            Implementation::instance(value),
        )
    }

    /// Factory run once per provider.
    pub fn add_singleton_factory<T, F>(&mut self, requires: Vec<Key>, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.add_factory(Lifetime::Singleton, requires, factory)
    }

    /// Factory run once per scope session.
    pub fn add_scoped_factory<T, F>(&mut self, requires: Vec<Key>, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.add_factory(Lifetime::Scoped, requires, factory)
    }

    /// Factory run on every resolution.
    pub fn add_transient_factory<T, F>(&mut self, requires: Vec<Key>, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.add_factory(Lifetime::Transient, requires, factory)
    }

    fn add_factory<T, F>(&mut self, lifetime: Lifetime, requires: Vec<Key>, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register(key_of_type::<T>(), lifetime, Implementation::factory(requires, factory))
    }

    /// Named binding of a concrete type.
    pub fn add_named_factory<T, F>(
        &mut self,
        name: &'static str,
        lifetime: Lifetime,
        requires: Vec<Key>,
        factory: F,
    ) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register(
            named_key_of_type::<T>(name),
            lifetime,
            Implementation::factory(requires, factory),
        )
    }

    // ----- Async factories -----

    /// Async factory run once per provider.
    ///
    /// Concurrent first requests wait for a single run of the factory.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use tessera_di::{keys, Resolver, ServiceCollection};
    ///
    /// struct Pool {
    ///     size: usize,
    /// }
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), tessera_di::DiError> {
    /// let mut services = ServiceCollection::new();
    /// services.add_singleton_async::<Pool, _, _>(keys![], |_deps| async {
    ///     tokio::time::sleep(Duration::from_millis(1)).await;
    ///     Ok(Pool { size: 8 })
    /// });
    ///
    /// let provider = services.build();
    /// assert_eq!(provider.get::<Pool>().await?.size, 8);
    /// # Ok(())
    /// # }
    /// ```
    pub fn add_singleton_async<T, F, Fut>(&mut self, requires: Vec<Key>, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        self.register(key_of_type::<T>(), Lifetime::Singleton, Implementation::async_factory(requires, factory))
    }

    pub fn add_scoped_async<T, F, Fut>(&mut self, requires: Vec<Key>, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        self.register(key_of_type::<T>(), Lifetime::Scoped, Implementation::async_factory(requires, factory))
    }

    pub fn add_transient_async<T, F, Fut>(&mut self, requires: Vec<Key>, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        self.register(key_of_type::<T>(), Lifetime::Transient, Implementation::async_factory(requires, factory))
    }

    // ----- Trait objects -----

    /// Bind a pre-built trait object.
    pub fn add_singleton_trait<T>(&mut self, value: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register(key_of_trait::<T>(), Lifetime::Singleton, Implementation::trait_instance(value))
    }

    pub fn add_named_singleton_trait<T>(&mut self, name: &'static str, value: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register(
            named_key_of_trait::<T>(name),
            Lifetime::Singleton,
            Implementation::trait_instance(value),
        )
    }

    /// Factory for a trait object.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use tessera_di::{Lifetime, Resolver, ServiceCollection};
    ///
    /// trait Clock: Send + Sync {
    ///     fn now(&self) -> u64;
    /// }
    ///
    /// struct Fixed;
    /// impl Clock for Fixed {
    ///     fn now(&self) -> u64 {
    ///         1_700_000_000
    ///     }
    /// }
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), tessera_di::DiError> {
    /// let mut services = ServiceCollection::new();
    /// services.add_trait_factory::<dyn Clock, _>(Lifetime::Singleton, vec![], |_| {
    ///     Ok(Arc::new(Fixed) as Arc<dyn Clock>)
    /// });
    ///
    /// let provider = services.build();
    /// assert_eq!(provider.get_trait::<dyn Clock>().await?.now(), 1_700_000_000);
    /// # Ok(())
    /// # }
    /// ```
    pub fn add_trait_factory<T, F>(&mut self, lifetime: Lifetime, requires: Vec<Key>, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Dependencies) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.register(key_of_trait::<T>(), lifetime, Implementation::trait_factory(requires, factory))
    }

    pub fn add_named_trait_factory<T, F>(
        &mut self,
        name: &'static str,
        lifetime: Lifetime,
        requires: Vec<Key>,
        factory: F,
    ) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Dependencies) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.register(
            named_key_of_trait::<T>(name),
            lifetime,
            Implementation::trait_factory(requires, factory),
        )
    }

    pub fn add_async_trait_factory<T, F, Fut>(&mut self, lifetime: Lifetime, requires: Vec<Key>, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, BoxError>> + Send + 'static,
    {
        self.register(key_of_trait::<T>(), lifetime, Implementation::async_trait_factory(requires, factory))
    }

    // ----- Aliases -----

    /// Make `key` resolvable by name via
    /// [`ServiceProvider::resolve_alias`]. An alias can point at one key only.
    pub fn add_alias(&mut self, alias: impl Into<String>, key: Key) -> DiResult<&mut Self> {
        self.registry.add_alias(alias, key)?;
        Ok(self)
    }

    // ----- Configuration -----

    /// Register a resolution observer.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use tessera_di::{ServiceCollection, TracingObserver};
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_observer(Arc::new(TracingObserver));
    /// ```
    pub fn add_observer(&mut self, observer: Arc<dyn DiObserver>) -> &mut Self {
        self.observers.add(observer);
        self
    }

    /// Use `options` for the provider this collection builds.
    ///
    /// Fails with [`DiError::InvalidOptions`](crate::DiError::InvalidOptions) when the options do not validate;
    /// the previous options stay in place.
    pub fn with_options(&mut self, options: ContainerOptions) -> DiResult<&mut Self> {
        self.options = options.validate()?;
        Ok(self)
    }

    /// Replace the default [`DeclaredDependencies`] introspector.
    pub fn with_introspector(&mut self, introspector: Arc<dyn DependencyIntrospector>) -> &mut Self {
        self.introspector = introspector;
        self
    }

    // ----- Inspection -----

    pub fn contains(&self, key: &Key) -> bool {
        self.registry.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Registered descriptors in registration order.
    pub fn get_service_descriptors(&self) -> Vec<ServiceDescriptor> {
        self.registry.iter().map(|descriptor| (**descriptor).clone()).collect()
    }

    // ----- Building -----

    /// Plan every binding and report missing bindings, cycles and captive
    /// dependencies without building anything.
    pub fn validate(&self) -> ValidationReport {
        validate_registry(&self.registry, self.introspector.as_ref(), self.options.max_depth)
    }

    pub fn build(self) -> ServiceProvider {
        ServiceProvider::new(self.registry, self.observers, self.introspector, self.options)
    }

    /// [`build`](Self::build) after a successful [`validate`](Self::validate).
    pub fn build_validated(self) -> DiResult<ServiceProvider> {
        self.validate().into_result()?;
        Ok(self.build())
    }
}

//! # tessera-di
//!
//! Async dependency injection with planned resolution.
//!
//! ## Features
//!
//! - **Lifetimes**: singleton, scoped and transient services
//! - **Planned resolution**: the whole dependency graph is expanded and checked
//!   (missing bindings, cycles with their full path, singletons capturing
//!   scoped services) before any factory runs
//! - **Async factories**: constructors may await; concurrent requests for one
//!   singleton or scoped instance wait for a single construction
//! - **Scope sessions** with reverse-order, failure-tolerant teardown
//! - **Overrides** that shadow a binding for one session and vanish with it
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_di::{keys, Resolver, ServiceCollection};
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tessera_di::DiError> {
//! let mut services = ServiceCollection::new();
//! services.add_singleton(Database {
//!     connection_string: "postgres://localhost".to_string(),
//! });
//! services.add_transient_factory::<UserService, _>(keys![Database], |deps| {
//!     Ok(UserService { db: deps.get::<Database>()? })
//! });
//!
//! let provider = services.build();
//! let users = provider.get::<UserService>().await?;
//! assert_eq!(users.db.connection_string, "postgres://localhost");
//! provider.dispose_all().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Service Lifetimes
//!
//! - **Singleton**: created once per provider, released by
//!   [`ServiceProvider::dispose_all`]
//! - **Scoped**: created once per [`Scope`], released by [`Scope::close`]
//! - **Transient**: created on every resolution; instances with a release
//!   hook are released with the session that resolved them
//!
//! ## Errors
//!
//! ```rust
//! use tessera_di::{keys, key_of_type, DiError, Resolver, ServiceCollection};
//!
//! struct A;
//! struct B;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut services = ServiceCollection::new();
//! services.add_transient_factory::<A, _>(keys![B], |_| Ok(A));
//! services.add_transient_factory::<B, _>(keys![A], |_| Ok(B));
//! let provider = services.build();
//!
//! match provider.get::<A>().await {
//!     Err(DiError::Circular(path)) => {
//!         assert_eq!(path, vec![key_of_type::<A>(), key_of_type::<B>(), key_of_type::<A>()]);
//!     }
//!     _ => unreachable!(),
//! }
//! # }
//! ```

pub mod collection;
pub mod config;
pub mod descriptors;
pub mod error;
pub mod graph;
pub mod introspect;
pub mod key;
pub mod lifetime;
pub mod observer;
pub mod overrides;
pub mod provider;
pub mod traits;
pub mod validation;

mod internal;
mod registration;

pub use collection::{ServiceCollection, ServiceCollectionExt, ServiceCollectionModuleExt, ServiceModule};
pub use config::ContainerOptions;
pub use descriptors::{AnyArc, BindingId, BoxFuture, Implementation, ServiceDescriptor};
pub use error::{BoxError, DiError, DiResult, SharedError, TeardownError};
pub use graph::{ActiveBinding, BindingSource, ConstructionNode, ConstructionPlan, GraphBuilder, VisitState};
pub use introspect::{DeclaredDependencies, DependencyIntrospector};
pub use key::{key_of_trait, key_of_type, named_key_of_trait, named_key_of_type, Key};
pub use lifetime::Lifetime;
pub use observer::{DiObserver, MetricsObserver, TracingObserver};
pub use overrides::OverrideGuard;
pub use provider::{Dependencies, ResolverContext, Scope, ScopeId, ServiceProvider};
pub use registration::Registry;
pub use traits::{AsyncDispose, Dispose, Resolver, ResolverCore};
pub use validation::ValidationReport;

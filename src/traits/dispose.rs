//! Release traits for resource cleanup.

use crate::error::BoxError;

/// Synchronous release of a service's resources.
///
/// Attach it to a binding with
/// [`Implementation::with_dispose`](crate::Implementation::with_dispose). Hooks
/// run in reverse construction order when the owning scope closes or the
/// provider is disposed; an error is collected and the remaining hooks still run.
///
/// # Examples
///
/// ```
/// use tessera_di::{BoxError, Dispose};
///
/// struct Cache {
///     name: String,
/// }
///
/// impl Dispose for Cache {
///     fn dispose(&self) -> Result<(), BoxError> {
///         println!("flushing {}", self.name);
///         Ok(())
///     }
/// }
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Release the resources held by the instance.
    fn dispose(&self) -> Result<(), BoxError>;
}

/// Asynchronous release of a service's resources.
///
/// Attach it with
/// [`Implementation::with_async_dispose`](crate::Implementation::with_async_dispose).
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use tessera_di::{AsyncDispose, BoxError};
///
/// struct Connection {
///     id: String,
/// }
///
/// #[async_trait]
/// impl AsyncDispose for Connection {
///     async fn dispose(&self) -> Result<(), BoxError> {
///         println!("closing {}", self.id);
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait AsyncDispose: Send + Sync + 'static {
    /// Release the resources held by the instance.
    async fn dispose(&self) -> Result<(), BoxError>;
}

//! Resolution observers.
//!
//! Observers receive a callback for every top-level and nested resolution,
//! plus one when a scope session closes. They are called synchronously on the
//! resolving task, so keep them cheap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::DiError;
use crate::key::Key;
use crate::provider::ScopeId;

/// Hooks into resolution events.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tessera_di::{DiObserver, Key, ServiceCollection};
///
/// struct Slow;
///
/// impl DiObserver for Slow {
///     fn resolving(&self, _key: &Key) {}
///
///     fn resolved(&self, key: &Key, elapsed: Duration) {
///         if elapsed > Duration::from_millis(50) {
///             eprintln!("slow resolution of {key}: {elapsed:?}");
///         }
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services.add_observer(Arc::new(Slow));
/// ```
pub trait DiObserver: Send + Sync {
    /// A resolution of `key` is starting.
    fn resolving(&self, key: &Key);

    /// `key` resolved successfully.
    fn resolved(&self, key: &Key, elapsed: Duration);

    /// Resolution of `key` failed.
    fn failed(&self, _key: &Key, _error: &DiError) {}

    /// A scope session closed; `failures` release hooks reported an error.
    fn scope_closed(&self, _scope: ScopeId, _failures: usize) {}
}

/// Registered observers, notified in registration order.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn DiObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn DiObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    #[inline]
    pub(crate) fn resolving(&self, key: &Key) {
        for observer in &self.observers {
            observer.resolving(key);
        }
    }

    #[inline]
    pub(crate) fn resolved(&self, key: &Key, elapsed: Duration) {
        for observer in &self.observers {
            observer.resolved(key, elapsed);
        }
    }

    #[inline]
    pub(crate) fn failed(&self, key: &Key, error: &DiError) {
        for observer in &self.observers {
            observer.failed(key, error);
        }
    }

    #[inline]
    pub(crate) fn scope_closed(&self, scope: ScopeId, failures: usize) {
        for observer in &self.observers {
            observer.scope_closed(scope, failures);
        }
    }
}

/// Observer that forwards events to `tracing`.
///
/// Successful resolutions are logged at `trace`, failures at `debug`
/// (planning errors) or `warn` (everything else).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DiObserver for TracingObserver {
    fn resolving(&self, key: &Key) {
        trace!(capability = %key, "resolving");
    }

    fn resolved(&self, key: &Key, elapsed: Duration) {
        trace!(capability = %key, ?elapsed, "resolved");
    }

    fn failed(&self, key: &Key, error: &DiError) {
        if error.is_planning_error() {
            debug!(capability = %key, %error, "resolution rejected");
        } else {
            warn!(capability = %key, %error, "resolution failed");
        }
    }

    fn scope_closed(&self, scope: ScopeId, failures: usize) {
        if failures > 0 {
            warn!(%scope, failures, "scope closed with release failures");
        } else {
            trace!(%scope, "scope closed");
        }
    }
}

/// Observer that counts resolutions and accumulates their duration.
#[derive(Debug, Default)]
pub struct MetricsObserver {
    resolutions: AtomicU64,
    failures: AtomicU64,
    total_nanos: AtomicU64,
    scopes_closed: AtomicU64,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution_count(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn scopes_closed(&self) -> u64 {
        self.scopes_closed.load(Ordering::Relaxed)
    }

    pub fn total_resolution_time(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }

    /// Mean duration of successful resolutions.
    pub fn average_resolution_time(&self) -> Option<Duration> {
        match self.resolution_count() {
            0 => None,
            count => Some(Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed) / count)),
        }
    }

    pub fn reset(&self) {
        self.resolutions.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.total_nanos.store(0, Ordering::Relaxed);
        self.scopes_closed.store(0, Ordering::Relaxed);
    }
}

impl DiObserver for MetricsObserver {
    fn resolving(&self, _key: &Key) {}

    fn resolved(&self, _key: &Key, elapsed: Duration) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    fn failed(&self, _key: &Key, _error: &DiError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn scope_closed(&self, _scope: ScopeId, _failures: usize) {
        self.scopes_closed.fetch_add(1, Ordering::Relaxed);
    }
}

//! Internal teardown bag for release hooks.

use std::sync::Arc;

use tracing::warn;

use crate::descriptors::{AnyArc, ReleaseFn};
use crate::error::TeardownError;
use crate::key::Key;
use crate::provider::ScopeId;

/// An instance waiting for its release hook.
pub(crate) struct TeardownEntry {
    pub(crate) key: Key,
    pub(crate) instance: AnyArc,
    pub(crate) release: Arc<ReleaseFn>,
}

/// Release hooks in construction order.
///
/// Sealing the bag marks its owner (scope or provider) as closed: later pushes
/// are refused so the caller can release the instance itself.
#[derive(Default)]
pub(crate) struct DisposeBag {
    entries: Vec<TeardownEntry>,
    sealed: bool,
}

impl DisposeBag {
    /// Add an entry; hands it back if the bag is already sealed.
    pub(crate) fn push(&mut self, entry: TeardownEntry) -> Result<(), TeardownEntry> {
        if self.sealed {
            return Err(entry);
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Seal the bag and take its entries, in construction order.
    pub(crate) fn seal(&mut self) -> Vec<TeardownEntry> {
        self.sealed = true;
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Run release hooks newest first. Every hook runs; failures are collected.
pub(crate) async fn release_reverse(
    entries: Vec<TeardownEntry>,
    scope: Option<ScopeId>,
) -> Vec<TeardownError> {
    let mut failures = Vec::new();
    for entry in entries.into_iter().rev() {
        if let Some(failure) = release_one(entry, scope).await {
            failures.push(failure);
        }
    }
    failures
}

pub(crate) async fn release_one(entry: TeardownEntry, scope: Option<ScopeId>) -> Option<TeardownError> {
    let TeardownEntry { key, instance, release } = entry;
    match release(instance).await {
        Ok(()) => None,
        Err(source) => {
            warn!(capability = %key, error = %source, "release hook failed");
            Some(TeardownError {
                key,
                scope,
                source: Arc::from(source),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::BoxFuture;
    use crate::error::BoxError;
    use crate::key::key_of_type;
    use std::sync::Mutex;

    fn entry(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>, fail: bool) -> TeardownEntry {
        let release: Arc<ReleaseFn> =
            Arc::new(move |_instance: AnyArc| -> BoxFuture<'static, Result<(), BoxError>> {
                let log = log.clone();
                Box::pin(async move {
                    log.lock().unwrap().push(name);
                    if fail {
                        Err::<(), BoxError>(format!("{name} refused").into())
                    } else {
                        Ok(())
                    }
                })
            });
        TeardownEntry {
            key: key_of_type::<String>().named(name),
            instance: Arc::new(()),
            release,
        }
    }

    #[tokio::test]
    async fn releases_newest_first_and_collects_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bag = DisposeBag::default();
        assert!(bag.push(entry("first", log.clone(), false)).is_ok());
        assert!(bag.push(entry("second", log.clone(), true)).is_ok());
        assert!(bag.push(entry("third", log.clone(), false)).is_ok());
        assert_eq!(bag.len(), 3);

        let failures = release_reverse(bag.seal(), None).await;

        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].key.service_name(), Some("second"));
        assert!(bag.is_empty());
    }

    #[test]
    fn sealed_bag_refuses_entries() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bag = DisposeBag::default();
        bag.seal();
        assert!(bag.is_sealed());
        assert!(bag.push(entry("late", log, false)).is_err());
    }
}

//! Whole-registry validation.
//!
//! Plans every registered binding as if nothing were cached yet and collects
//! every planning failure, so a misconfigured container can be rejected before
//! it serves its first request.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{DiError, DiResult};
use crate::graph::{ActiveBinding, BindingSource, GraphBuilder};
use crate::introspect::DependencyIntrospector;
use crate::key::Key;
use crate::registration::Registry;

/// Outcome of validating a registry.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Number of bindings planned.
    pub checked: usize,
    /// Problems found, one per distinct failure.
    pub errors: Vec<DiError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` for a clean report, otherwise [`DiError::Validation`].
    pub fn into_result(self) -> DiResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(DiError::Validation(self.errors))
        }
    }
}

struct Registered<'a>(&'a Registry);

impl BindingSource for Registered<'_> {
    fn binding(&self, key: &Key) -> Option<ActiveBinding> {
        self.0.get(key).cloned().map(ActiveBinding::registered)
    }
}

pub(crate) fn validate_registry(
    registry: &Registry,
    introspector: &dyn DependencyIntrospector,
    max_depth: usize,
) -> ValidationReport {
    let source = Registered(registry);
    let builder = GraphBuilder::new(&source, introspector).with_max_depth(max_depth);

    let mut report = ValidationReport::default();
    // the same failure is usually reachable from several roots
    let mut seen = HashSet::new();
    for key in registry.keys() {
        report.checked += 1;
        if let Err(error) = builder.plan(key) {
            if seen.insert(error.to_string()) {
                report.errors.push(error);
            }
        }
    }
    debug!(checked = report.checked, errors = report.errors.len(), "validated registry");
    report
}

//! Evaluation context: tracker lookups, forward placement references, and
//! the mutable cohort-name table a `withhold` call registers into.
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cohort::CohortNameTable;
use crate::filter::FilterHandle;
use crate::tracker::{UploadFailureTracker, UploadSuccessTracker};

/// Which rule kind an expression is being compiled for. Most builtins are
/// available everywhere; a handful (e.g. `withhold`) only make sense for
/// one kind, and [`crate::expr::eval`] checks `kind` before dispatching
/// them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleKind {
    Filter,
    Selector,
    Invariant,
    DownloadSelector,
    Cohort,
}

/// Everything the evaluator needs beyond the expression text itself:
/// named tracker instances, already-compiled placement filters (for
/// forward `placement(id)` references), and a scratch cohort-name table.
pub struct Bindings<'a> {
    pub kind: RuleKind,
    success_trackers: &'a HashMap<String, Arc<dyn UploadSuccessTracker>>,
    failure_trackers: &'a HashMap<String, Arc<dyn UploadFailureTracker>>,
    placement_filters: &'a HashMap<u16, FilterHandle>,
    pub cohort_names: RefCell<CohortNameTable>,
}

impl<'a> Bindings<'a> {
    pub fn new(
        kind: RuleKind,
        success_trackers: &'a HashMap<String, Arc<dyn UploadSuccessTracker>>,
        failure_trackers: &'a HashMap<String, Arc<dyn UploadFailureTracker>>,
        placement_filters: &'a HashMap<u16, FilterHandle>,
    ) -> Self {
        Self {
            kind,
            success_trackers,
            failure_trackers,
            placement_filters,
            cohort_names: RefCell::new(CohortNameTable::new()),
        }
    }

    /// Builds bindings with no trackers and no forward placement
    /// references, for contexts (tests, `country(...)`-only filters)
    /// that don't need them.
    pub fn bare(kind: RuleKind) -> OwnedBindings {
        OwnedBindings {
            kind,
            success_trackers: HashMap::new(),
            failure_trackers: HashMap::new(),
            placement_filters: HashMap::new(),
        }
    }

    pub fn success_tracker(&self, name: &str) -> Option<Arc<dyn UploadSuccessTracker>> {
        self.success_trackers.get(name).cloned()
    }

    pub fn failure_tracker(&self, name: &str) -> Option<Arc<dyn UploadFailureTracker>> {
        self.failure_trackers.get(name).cloned()
    }

    pub fn placement_filter(&self, id: u16) -> Option<FilterHandle> {
        self.placement_filters.get(&id).cloned()
    }

    /// Consumes these bindings, returning the cohort-name table built up
    /// by any `withhold` calls evaluated against it.
    pub fn into_cohort_table(self) -> CohortNameTable {
        self.cohort_names.into_inner()
    }
}

/// An owned version of [`Bindings`]'s backing maps, so callers without an
/// existing registry (tests, the config loader building its first
/// placement) can construct a `Bindings<'_>` borrowing from it.
pub struct OwnedBindings {
    kind: RuleKind,
    success_trackers: HashMap<String, Arc<dyn UploadSuccessTracker>>,
    failure_trackers: HashMap<String, Arc<dyn UploadFailureTracker>>,
    placement_filters: HashMap<u16, FilterHandle>,
}

impl OwnedBindings {
    pub fn with_success_tracker(mut self, name: impl Into<String>, tracker: Arc<dyn UploadSuccessTracker>) -> Self {
        self.success_trackers.insert(name.into(), tracker);
        self
    }

    pub fn with_failure_tracker(mut self, name: impl Into<String>, tracker: Arc<dyn UploadFailureTracker>) -> Self {
        self.failure_trackers.insert(name.into(), tracker);
        self
    }

    pub fn with_placement_filter(mut self, id: u16, filter: FilterHandle) -> Self {
        self.placement_filters.insert(id, filter);
        self
    }

    pub fn as_bindings(&self) -> Bindings<'_> {
        Bindings::new(self.kind, &self.success_trackers, &self.failure_trackers, &self.placement_filters)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::filter::All;

    #[test]
    fn bare_bindings_resolve_nothing() {
        let owned = Bindings::bare(RuleKind::Filter);
        let b = owned.as_bindings();
        assert!(b.success_tracker("anything").is_none());
        assert!(b.failure_tracker("anything").is_none());
        assert!(b.placement_filter(1).is_none());
    }

    #[test]
    fn with_placement_filter_is_visible_through_as_bindings() {
        let filter: FilterHandle = Arc::new(All);
        let owned = Bindings::bare(RuleKind::Filter).with_placement_filter(7, filter);
        let b = owned.as_bindings();
        assert!(b.placement_filter(7).is_some());
        assert!(b.placement_filter(8).is_none());
    }

    #[test]
    fn cohort_names_registers_in_order() {
        let owned = Bindings::bare(RuleKind::Cohort);
        let b = owned.as_bindings();
        let a = crate::cohort::literal_name("a");
        let c = crate::cohort::literal_name("b");
        let first = b.cohort_names.borrow_mut().register(a);
        let second = b.cohort_names.borrow_mut().register(c);
        assert_eq!(first, "0");
        assert_eq!(second, "1");
    }
}

//! The selector library: stateful node-selection strategies sharing the
//! init→select contract.
//!
//! [`NodeSelectorInit`] is the uninitialized, composable form built by the
//! expression evaluator; calling [`NodeSelectorInit::init`] once per node
//! snapshot produces a [`NodeSelector`], a read-only closure-like object
//! invoked many times (once per `Select` call) for that snapshot's
//! lifetime. Combinators (e.g. [`unvetted`]) wrap a child
//! [`SelectorInitHandle`] and, at init time, call through to it to obtain
//! the concrete delegate they drive at select time.
use std::collections::HashSet;
use std::sync::Arc;

use crate::context::CancellationToken;
use crate::error::PlacementError;
use crate::filter::{FilterContext, FilterHandle};
use crate::node::{NodeId, SelectedNode};

pub mod attribute_group;
pub mod balanced;
pub mod best_of_n;
pub mod choice_of_n;
pub mod choice_of_n_selection;
pub mod dual;
pub mod filter_best;
pub mod filter_delegate;
pub mod fixed;
pub mod multi;
pub mod random;
pub mod reduce;
pub mod stream;
pub mod topology;
pub mod unvetted;
pub mod weighted;

/// The arguments to a single `Select` call, threaded unchanged through
/// every combinator layer down to the leaf selector that does the actual
/// picking.
#[derive(Clone, Copy)]
pub struct SelectCall<'a> {
    /// The placement constraint ID this selection is for, carried only so
    /// an `insufficient-nodes` error can name it.
    pub placement: u16,
    /// The node on whose behalf this selection is made (threaded to
    /// tracker-backed comparators and filters).
    pub requester: NodeId,
    /// The number of nodes requested.
    pub n: usize,
    /// Node IDs that must not appear in the result.
    pub excluded: &'a HashSet<NodeId>,
    /// Nodes already selected in a prior call for the same upload, also
    /// excluded from the result and counted against group quotas.
    pub already_selected: &'a [SelectedNode],
    /// Cooperative cancellation, checked between candidates/groups.
    pub cancel: &'a CancellationToken,
}

impl<'a> SelectCall<'a> {
    /// Returns a copy of this call requesting a different count.
    pub fn with_n(&self, n: usize) -> SelectCall<'a> {
        SelectCall { n, ..*self }
    }

    /// Returns the IDs of `already_selected`, for building exclusion sets.
    pub fn already_selected_ids(&self) -> HashSet<NodeId> {
        self.already_selected.iter().map(|n| n.id).collect()
    }

    /// Builds the `insufficient-nodes` error for this call given what was
    /// actually achieved.
    pub fn insufficient(&self, achieved: usize) -> PlacementError {
        PlacementError::insufficient(self.placement, self.n, achieved)
    }
}

/// A stateful, read-only selection strategy bound to one node snapshot.
pub trait NodeSelector: Send + Sync {
    /// Returns up to `call.n` nodes satisfying this selector's strategy,
    /// excluding `call.excluded` and `call.already_selected`. Returns an
    /// `insufficient-nodes` error carrying the achieved count when the
    /// strategy is exhausted before reaching `call.n`.
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError>;
}

/// A shared, type-erased selector handle.
pub type SelectorHandle = Arc<dyn NodeSelector>;

/// The uninitialized, composable form of a selector: given the current
/// node snapshot and the placement's base filter, produces a
/// [`SelectorHandle`] ready to be called repeatedly.
pub trait NodeSelectorInit: Send + Sync {
    /// Builds the stateful selector for one node snapshot.
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle;
}

/// A shared, type-erased selector-init handle.
pub type SelectorInitHandle = Arc<dyn NodeSelectorInit>;

/// Evaluates `filter` against `node` from `requester`'s point of view.
pub(crate) fn filter_matches(filter: &FilterHandle, requester: NodeId, node: &SelectedNode) -> bool {
    filter.matches(&FilterContext::new(requester), node)
}

/// Returns `true` if `node` is eligible: not excluded, not already
/// selected, not already chosen in this call, and passes `filter`.
pub(crate) fn is_eligible(
    node: &SelectedNode,
    filter: &FilterHandle,
    requester: NodeId,
    excluded: &HashSet<NodeId>,
    already: &HashSet<NodeId>,
    chosen: &HashSet<NodeId>,
) -> bool {
    !excluded.contains(&node.id)
        && !already.contains(&node.id)
        && !chosen.contains(&node.id)
        && filter_matches(filter, requester, node)
}

//! `reduce(delegate, sortOrder, atLeast...)` — sort a large batch and
//! include nodes greedily until every `atLeast` requirement is met.
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::PlacementError;
use crate::filter::FilterHandle;
use crate::node::{NodeAttribute, SelectedNode};
use crate::score::CompareNodes;

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, SelectorInitHandle};

/// `atLeast(attr, k)` — reports "need more" until at least `k` distinct
/// values of `attr` are represented among the nodes included so far.
#[derive(Clone)]
pub struct AtLeast {
    /// The attribute whose distinct values are counted.
    pub attr: NodeAttribute,
    /// The minimum number of distinct values required.
    pub k: usize,
}

impl AtLeast {
    fn needs_more(&self, seen: &HashSet<String>) -> bool {
        seen.len() < self.k
    }
}

/// How many candidates `reduce` asks its delegate for, relative to the
/// caller's `n`. No explicit batch size is mandated; this multiplier is
/// the implementation's choice.
pub const DEFAULT_BATCH_MULTIPLIER: usize = 4;

/// Builds a [`ReduceSelector`] wrapping `delegate`.
pub struct ReduceInit {
    /// The oversampled candidate source.
    pub delegate: SelectorInitHandle,
    /// Descending sort order applied to the batch before greedy
    /// inclusion.
    pub sort_order: CompareNodes,
    /// Diversity requirements checked after each inclusion.
    pub at_least: Vec<AtLeast>,
    /// Batch-size multiplier, see [`DEFAULT_BATCH_MULTIPLIER`].
    pub batch_multiplier: usize,
}

impl NodeSelectorInit for ReduceInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        Arc::new(ReduceSelector {
            delegate: self.delegate.init(nodes, base_filter),
            sort_order: self.sort_order.clone(),
            at_least: self.at_least.clone(),
            batch_multiplier: self.batch_multiplier.max(1),
        })
    }
}

/// Sorts a large delegate-supplied batch by `sort_order` (descending) and
/// greedily includes nodes until every `at_least` requirement is
/// satisfied, capped at the caller's requested `n`. Stopping early by
/// this policy is not an `insufficient-nodes` error.
pub struct ReduceSelector {
    delegate: SelectorHandle,
    sort_order: CompareNodes,
    at_least: Vec<AtLeast>,
    batch_multiplier: usize,
}

impl NodeSelector for ReduceSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        let batch_size = call.n.saturating_mul(self.batch_multiplier);
        let mut candidates = match self.delegate.select(&call.with_n(batch_size)) {
            Ok(nodes) => nodes,
            Err(PlacementError::InsufficientNodes { achieved, .. }) if achieved > 0 => {
                // Partial batch: the delegate doesn't hand back partial
                // results on error, so fall back to asking for exactly
                // what it could achieve.
                self.delegate.select(&call.with_n(achieved))?
            }
            Err(other) => return Err(other),
        };

        candidates.sort_by(|a, b| self.sort_order.compare(call.requester, b, a));

        let mut seen: Vec<HashSet<String>> = vec![HashSet::new(); self.at_least.len()];
        let mut result = Vec::new();
        for node in candidates {
            if result.len() == call.n {
                break;
            }
            result.push(node.clone());
            for (predicate, seen_values) in self.at_least.iter().zip(seen.iter_mut()) {
                seen_values.insert(predicate.attr.apply(&node));
            }
            if self
                .at_least
                .iter()
                .zip(seen.iter())
                .all(|(predicate, seen_values)| !predicate.needs_more(seen_values))
            {
                break;
            }
        }
        Ok(result)
    }
}

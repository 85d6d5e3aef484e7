//! `fixed(k, delegate)` — always request a fixed count from `delegate`,
//! ignoring the caller's `n`.
use std::sync::Arc;

use crate::error::PlacementError;
use crate::filter::FilterHandle;
use crate::node::SelectedNode;

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, SelectorInitHandle};

/// Builds a [`FixedSelector`] wrapping `delegate`.
pub struct FixedInit {
    /// The count always requested from `delegate`.
    pub k: usize,
    /// The wrapped candidate source.
    pub delegate: SelectorInitHandle,
}

impl NodeSelectorInit for FixedInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        Arc::new(FixedSelector {
            k: self.k,
            delegate: self.delegate.init(nodes, base_filter),
        })
    }
}

/// Ignores the caller's `n` and always asks `delegate` for `k`.
pub struct FixedSelector {
    k: usize,
    delegate: SelectorHandle,
}

impl NodeSelector for FixedSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        self.delegate.select(&call.with_n(self.k))
    }
}

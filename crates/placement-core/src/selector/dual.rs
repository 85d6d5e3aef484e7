//! `dual(fraction, primary, fallback)` — fill most of the quota from
//! `primary`, the remainder from `fallback`.
use std::sync::Arc;

use crate::error::PlacementError;
use crate::filter::FilterHandle;
use crate::node::SelectedNode;

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, SelectorInitHandle};

/// Builds a [`DualSelector`] over `primary` and `fallback`.
pub struct DualInit {
    /// Target fraction of `n` to draw from `primary`.
    pub fraction: f64,
    /// The primary candidate source.
    pub primary: SelectorInitHandle,
    /// The fallback source for whatever `primary` could not supply.
    pub fallback: SelectorInitHandle,
}

impl NodeSelectorInit for DualInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        Arc::new(DualSelector {
            fraction: self.fraction.clamp(0.0, 1.0),
            primary: self.primary.init(nodes, base_filter),
            fallback: self.fallback.init(nodes, base_filter),
        })
    }
}

/// Tries to fill `fraction * n` from `primary`; the remainder (including
/// all of `n` if `primary` falls short) comes from `fallback`.
pub struct DualSelector {
    fraction: f64,
    primary: SelectorHandle,
    fallback: SelectorHandle,
}

impl NodeSelector for DualSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        let primary_want = ((call.n as f64) * self.fraction).round() as usize;

        let primary_picks = match self.primary.select(&call.with_n(primary_want)) {
            Ok(picks) => picks,
            Err(PlacementError::InsufficientNodes { achieved, .. }) if achieved == 0 => Vec::new(),
            Err(other) => return Err(other),
        };

        let remainder = call.n.saturating_sub(primary_picks.len());
        let mut combined_excluded = call.excluded.clone();
        combined_excluded.extend(primary_picks.iter().map(|n| n.id));
        let fallback_call = SelectCall {
            excluded: &combined_excluded,
            ..call.with_n(remainder)
        };

        let mut result = primary_picks;
        if remainder > 0 {
            let fallback_picks = match self.fallback.select(&fallback_call) {
                Ok(picks) => picks,
                Err(PlacementError::InsufficientNodes { achieved, .. }) if achieved == 0 => Vec::new(),
                Err(other) => return Err(other),
            };
            result.extend(fallback_picks);
        }

        if result.len() < call.n {
            return Err(call.insufficient(result.len()));
        }
        Ok(result)
    }
}

//! `weighted(value, default, filter)` / `weightedf(valueFn, filter)` —
//! Efraimidis–Spirakis weighted sampling on a flat pool.
use std::sync::Arc;

use rand::Rng;

use crate::error::PlacementError;
use crate::filter::FilterHandle;
use crate::node::{NodeValue, SelectedNode};

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, is_eligible};

/// Computes the Efraimidis–Spirakis sampling key for weight `w` given a
/// uniform draw `u` in `(0, 1]`, in log space (`log(u) / w`) to avoid the
/// underflow that `u.powf(1.0 / w)` suffers at small weights. Larger keys
/// win; non-positive weights are pinned to negative infinity so they are
/// never selected, and the convention here is that *larger* is better, so
/// a forbidden node gets `f64::NEG_INFINITY`.
pub fn sampling_key(weight: f64, u: f64) -> f64 {
    if weight <= 0.0 {
        return f64::NEG_INFINITY;
    }
    u.ln() / weight
}

/// Builds a [`WeightedSelector`] over the node pool.
pub struct WeightedInit {
    /// The per-node weight. Zero weights are replaced by `default`;
    /// negative or `NaN` weights are treated as non-positive (never
    /// selected).
    pub value: NodeValue,
    /// Replacement weight for nodes whose `value` evaluates to exactly
    /// zero.
    pub default: f64,
    /// An additional filter restricting the pool, unioned with the
    /// placement's base filter at select time.
    pub filter: Option<FilterHandle>,
}

impl NodeSelectorInit for WeightedInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        let filter: FilterHandle = match &self.filter {
            Some(extra) => Arc::new(crate::filter::And(vec![base_filter.clone(), extra.clone()])),
            None => base_filter.clone(),
        };
        Arc::new(WeightedSelector {
            nodes: nodes.to_vec(),
            value: self.value.clone(),
            default: self.default,
            filter,
        })
    }
}

/// Efraimidis–Spirakis weighted reservoir sampling over the eligible
/// pool: each node's key is its log-space sampling key, and the `n`
/// largest keys win.
pub struct WeightedSelector {
    nodes: Vec<SelectedNode>,
    value: NodeValue,
    default: f64,
    filter: FilterHandle,
}

impl WeightedSelector {
    fn select_with_rng(&self, call: &SelectCall<'_>, rng: &mut impl Rng) -> Result<Vec<SelectedNode>, PlacementError> {
        let already = call.already_selected_ids();
        let mut keyed: Vec<(f64, &SelectedNode)> = self
            .nodes
            .iter()
            .filter(|n| is_eligible(n, &self.filter, call.requester, call.excluded, &already, &Default::default()))
            .map(|n| {
                let raw_weight = self.value.apply(n);
                let weight = if raw_weight == 0.0 { self.default } else { raw_weight };
                let u: f64 = rng.r#gen::<f64>().clamp(f64::MIN_POSITIVE, 1.0);
                (sampling_key(weight, u), n)
            })
            .collect();

        keyed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let taken: Vec<SelectedNode> = keyed.into_iter().filter(|(key, _)| key.is_finite()).take(call.n).map(|(_, n)| n.clone()).collect();

        if taken.len() < call.n {
            return Err(call.insufficient(taken.len()));
        }
        Ok(taken)
    }
}

impl NodeSelector for WeightedSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        self.select_with_rng(call, &mut rand::thread_rng())
    }
}

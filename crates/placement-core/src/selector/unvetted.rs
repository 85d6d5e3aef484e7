//! `unvetted(fraction, delegate)` — stochastically swap in unvetted nodes
//! to bootstrap their reputation.
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::PlacementError;
use crate::filter::FilterHandle;
use crate::node::SelectedNode;

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, SelectorInitHandle, is_eligible};

/// Builds an [`UnvettedSelector`] wrapping `delegate`.
pub struct UnvettedInit {
    /// Target fraction of each selection to draw from unvetted nodes,
    /// clamped to `[0, 1]` (`NaN` treated as `0`).
    pub fraction: f64,
    /// The selector whose picks are partially replaced.
    pub delegate: SelectorInitHandle,
}

impl NodeSelectorInit for UnvettedInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        let fraction = if self.fraction.is_nan() {
            0.0
        } else {
            self.fraction.clamp(0.0, 1.0)
        };
        Arc::new(UnvettedSelector {
            fraction,
            unvetted_pool: nodes.iter().filter(|n| !n.vetted).cloned().collect(),
            delegate: self.delegate.init(nodes, base_filter),
        })
    }
}

/// Replaces a stochastically-rounded fraction of `delegate`'s picks with
/// random unvetted nodes.
pub struct UnvettedSelector {
    fraction: f64,
    unvetted_pool: Vec<SelectedNode>,
    delegate: SelectorHandle,
}

impl UnvettedSelector {
    fn select_with_rng(&self, call: &SelectCall<'_>, rng: &mut impl Rng) -> Result<Vec<SelectedNode>, PlacementError> {
        let mut picks = self.delegate.select(call)?;

        let expected = self.fraction * call.n as f64;
        let base = expected.floor();
        let frac_part = expected - base;
        let round_up = if rng.gen_bool(frac_part.clamp(0.0, 1.0)) { 1 } else { 0 };
        let swap_count = (base as usize + round_up).min(picks.len());
        if swap_count == 0 {
            return Ok(picks);
        }

        let already = call.already_selected_ids();
        let current_ids: std::collections::HashSet<_> = picks.iter().map(|n| n.id).collect();
        let all_filter: FilterHandle = Arc::new(crate::filter::All);
        let mut replacements: Vec<&SelectedNode> = self
            .unvetted_pool
            .iter()
            .filter(|n| is_eligible(n, &all_filter, call.requester, call.excluded, &already, &current_ids))
            .collect();
        replacements.shuffle(rng);

        let positions: Vec<usize> = {
            let mut idx: Vec<usize> = (0..picks.len()).collect();
            idx.shuffle(rng);
            idx.into_iter().take(swap_count).collect()
        };

        for (slot, replacement) in positions.into_iter().zip(replacements.into_iter()) {
            picks[slot] = replacement.clone();
        }
        Ok(picks)
    }
}

impl NodeSelector for UnvettedSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        self.select_with_rng(call, &mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::filter::All;
    use crate::node::{NodeId, NODE_ID_LEN};
    use crate::selector::random::RandomInit;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn node(id: u8, vetted: bool) -> SelectedNode {
        SelectedNode {
            id: NodeId::from_bytes([id; NODE_ID_LEN]),
            address: String::new(),
            last_net: String::new(),
            last_ip_port: String::new(),
            country_code: "DE".into(),
            continent: "Europe".into(),
            vetted,
            exiting: false,
            online: true,
            suspended: false,
            free_disk: 0,
            piece_count: 0,
            wallet: String::new(),
            email: String::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn swaps_expected_fraction_in_expectation() {
        let mut nodes: Vec<_> = (0..10).map(|i| node(i, true)).collect();
        nodes.extend((10..20).map(|i| node(i, false)));
        let base_filter: FilterHandle = Arc::new(All);
        let selector = UnvettedSelector {
            fraction: 0.25,
            unvetted_pool: nodes.iter().filter(|n| !n.vetted).cloned().collect(),
            delegate: RandomInit.init(&nodes, &base_filter),
        };
        let excluded = HashSet::new();
        let call = SelectCall {
            placement: 0,
            requester: NodeId::from_bytes([99; NODE_ID_LEN]),
            n: 4,
            excluded: &excluded,
            already_selected: &[],
            cancel: &crate::context::CancellationToken::none(),
        };
        let mut rng = StdRng::seed_from_u64(5);
        let picks = selector.select_with_rng(&call, &mut rng).expect("enough nodes");
        assert_eq!(picks.len(), 4);
        assert_eq!(picks.iter().filter(|n| !n.vetted).count(), 1, "expected count for fraction 0.25 over n=4");
    }
}

//! `random` — Knuth shuffle of the filtered pool, first `n` survivors.
use rand::Rng;
use rand::seq::SliceRandom;

use crate::filter::FilterHandle;
use crate::node::SelectedNode;

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, is_eligible};

/// Builds a [`RandomSelector`] over the filtered node pool.
pub struct RandomInit;

impl NodeSelectorInit for RandomInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        std::sync::Arc::new(RandomSelector {
            nodes: nodes.to_vec(),
            filter: base_filter.clone(),
        })
    }
}

/// Shuffles the eligible pool and returns the first `n` survivors.
pub struct RandomSelector {
    nodes: Vec<SelectedNode>,
    filter: FilterHandle,
}

impl RandomSelector {
    fn select_with_rng(
        &self,
        call: &SelectCall<'_>,
        rng: &mut impl Rng,
    ) -> Result<Vec<SelectedNode>, crate::error::PlacementError> {
        let already = call.already_selected_ids();
        let mut pool: Vec<&SelectedNode> = self
            .nodes
            .iter()
            .filter(|n| is_eligible(n, &self.filter, call.requester, call.excluded, &already, &Default::default()))
            .collect();
        pool.shuffle(rng);
        let taken: Vec<SelectedNode> = pool.into_iter().take(call.n).cloned().collect();
        if taken.len() < call.n {
            return Err(call.insufficient(taken.len()));
        }
        Ok(taken)
    }
}

impl NodeSelector for RandomSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, crate::error::PlacementError> {
        self.select_with_rng(call, &mut rand::thread_rng())
    }
}

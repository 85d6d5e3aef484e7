//! `choice-of-two(cmp, delegate)` / `choice-of-n(cmp, k, delegate)` —
//! oversample, then keep the best of each k-tuple.
use std::sync::Arc;

use crate::error::PlacementError;
use crate::node::SelectedNode;
use crate::score::CompareNodes;

use super::{NodeSelector, SelectCall, SelectorHandle, SelectorInitHandle};

/// Builds a [`ChoiceOfNSelector`] asking `delegate` for `k` times as many
/// candidates, winnowed down via `cmp`.
pub struct ChoiceOfNInit {
    /// The comparator deciding the winner of each k-tuple.
    pub cmp: CompareNodes,
    /// Candidates drawn per seat.
    pub k: usize,
    /// The oversampled candidate source.
    pub delegate: SelectorInitHandle,
}

impl ChoiceOfNInit {
    /// `choice-of-two` is `choice-of-n` with `k = 2`.
    pub fn choice_of_two(cmp: CompareNodes, delegate: SelectorInitHandle) -> Self {
        Self { cmp, k: 2, delegate }
    }
}

impl super::NodeSelectorInit for ChoiceOfNInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &crate::filter::FilterHandle) -> SelectorHandle {
        Arc::new(ChoiceOfNSelector {
            cmp: self.cmp.clone(),
            k: self.k.max(1),
            delegate: self.delegate.init(nodes, base_filter),
        })
    }
}

/// Requests `k * n` candidates from `delegate`, groups them into k-tuples,
/// and keeps the winner of each tuple by `cmp`.
pub struct ChoiceOfNSelector {
    cmp: CompareNodes,
    k: usize,
    delegate: SelectorHandle,
}

impl NodeSelector for ChoiceOfNSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        let oversampled = call.n.saturating_mul(self.k);
        let candidates = self.delegate.select(&call.with_n(oversampled))?;

        let mut result = Vec::with_capacity(call.n);
        for chunk in candidates.chunks(self.k) {
            let Some((winner, rest)) = chunk.split_first() else {
                continue;
            };
            let mut best = winner;
            for candidate in rest {
                if self.cmp.compare(call.requester, candidate, best) == std::cmp::Ordering::Greater {
                    best = candidate;
                }
            }
            result.push(best.clone());
            if result.len() == call.n {
                break;
            }
        }

        if result.len() < call.n {
            return Err(call.insufficient(result.len()));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::filter::All;
    use crate::node::{NodeId, NodeValue, NODE_ID_LEN};
    use crate::score::ScoreNode;
    use crate::selector::random::RandomInit;
    use std::collections::HashSet;

    fn node(id: u8, free_disk: u64) -> SelectedNode {
        SelectedNode {
            id: NodeId::from_bytes([id; NODE_ID_LEN]),
            address: String::new(),
            last_net: String::new(),
            last_ip_port: String::new(),
            country_code: "DE".into(),
            continent: "Europe".into(),
            vetted: true,
            exiting: false,
            online: true,
            suspended: false,
            free_disk,
            piece_count: 0,
            wallet: String::new(),
            email: String::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn keeps_higher_scoring_node_per_pair() {
        let nodes: Vec<_> = (0..20).map(|i| node(i, u64::from(i))).collect();
        let base_filter: crate::filter::FilterHandle = Arc::new(All);
        let cmp = CompareNodes::from_score(ScoreNode::from_value(NodeValue::free_disk()));
        let init = ChoiceOfNInit::choice_of_two(cmp, Arc::new(RandomInit));
        let selector = init.init(&nodes, &base_filter);
        let excluded = HashSet::new();
        let call = SelectCall {
            placement: 0,
            requester: NodeId::from_bytes([99; NODE_ID_LEN]),
            n: 5,
            excluded: &excluded,
            already_selected: &[],
            cancel: &crate::context::CancellationToken::none(),
        };
        let result = selector.select(&call).expect("enough nodes for 2*n=10 draws");
        assert_eq!(result.len(), 5);
    }
}

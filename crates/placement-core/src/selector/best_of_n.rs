//! `best-of-n(tracker, ratio, delegate)` — oversample by `ratio` and keep
//! the top `n` by tracker score.
use std::sync::Arc;

use crate::error::PlacementError;
use crate::filter::FilterHandle;
use crate::node::SelectedNode;
use crate::tracker::UploadSuccessTracker;

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, SelectorInitHandle};

/// Builds a [`BestOfNSelector`] wrapping `delegate`.
pub struct BestOfNInit {
    /// Live score source ranking candidates.
    pub tracker: Arc<dyn UploadSuccessTracker>,
    /// Oversampling ratio applied to the caller's `n`.
    pub ratio: f64,
    /// The oversampled candidate source.
    pub delegate: SelectorInitHandle,
}

impl NodeSelectorInit for BestOfNInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        Arc::new(BestOfNSelector {
            tracker: self.tracker.clone(),
            ratio: self.ratio,
            delegate: self.delegate.init(nodes, base_filter),
        })
    }
}

/// Requests `round(ratio * n)` candidates from `delegate`, then keeps the
/// top `n` by tracker score (descending, `NaN` last).
pub struct BestOfNSelector {
    tracker: Arc<dyn UploadSuccessTracker>,
    ratio: f64,
    delegate: SelectorHandle,
}

impl NodeSelector for BestOfNSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        let oversampled = ((call.n as f64) * self.ratio).floor().max(call.n as f64) as usize;
        let mut candidates = self.delegate.select(&call.with_n(oversampled))?;

        let scores = self.tracker.get(call.requester);
        candidates.sort_by(|a, b| {
            let score_a = scores.get(&a.id).copied().unwrap_or(f64::NAN);
            let score_b = scores.get(&b.id).copied().unwrap_or(f64::NAN);
            match (score_a.is_nan(), score_b.is_nan()) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal),
            }
        });
        candidates.truncate(call.n);

        if candidates.len() < call.n {
            return Err(call.insufficient(candidates.len()));
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::filter::All;
    use crate::node::{NodeId, NODE_ID_LEN};
    use crate::selector::random::RandomInit;
    use crate::tracker::StaticSuccessTracker;
    use std::collections::{HashMap, HashSet};

    fn node(id: u8) -> SelectedNode {
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
            free_disk: 0,
            piece_count: 0,
            wallet: String::new(),
            email: String::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn keeps_top_n_by_score() {
        let nodes: Vec<_> = (0..20).map(node).collect();
        let mut scores = HashMap::new();
        for (i, n) in nodes.iter().enumerate() {
            scores.insert(n.id, i as f64);
        }
        let base_filter: FilterHandle = Arc::new(All);
        let init = BestOfNInit {
            tracker: Arc::new(StaticSuccessTracker(scores)),
            ratio: 2.0,
            delegate: Arc::new(RandomInit),
        };
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
        let result = selector.select(&call).expect("enough nodes");
        assert_eq!(result.len(), 5);
    }
}

//! `multi(selectors...)` — partition `n` across several selectors and
//! concatenate their results.
use std::sync::Arc;

use crate::error::PlacementError;
use crate::filter::FilterHandle;
use crate::node::SelectedNode;

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, SelectorInitHandle};

/// Builds a [`MultiSelector`] over `selectors`.
pub struct MultiInit(pub Vec<SelectorInitHandle>);

impl NodeSelectorInit for MultiInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        Arc::new(MultiSelector(
            self.0.iter().map(|s| s.init(nodes, base_filter)).collect(),
        ))
    }
}

/// Splits `n` evenly across its sub-selectors (remainder to the tail) and
/// concatenates their results. Duplicates across sub-selectors are
/// allowed, per the placement DSL's open question on this behavior.
pub struct MultiSelector(pub Vec<SelectorHandle>);

impl NodeSelector for MultiSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        if self.0.is_empty() {
            return Err(call.insufficient(0));
        }
        let share = call.n / self.0.len();
        let remainder = call.n % self.0.len();

        let mut result = Vec::with_capacity(call.n);
        for (i, selector) in self.0.iter().enumerate() {
            let is_tail = i + 1 == self.0.len();
            let want = share + if is_tail { remainder } else { 0 };
            if want == 0 {
                continue;
            }
            result.extend(selector.select(&call.with_n(want))?);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::filter::All;
    use crate::node::{NodeId, NODE_ID_LEN};
    use crate::selector::random::RandomInit;
    use std::collections::HashSet;

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
    fn splits_n_with_remainder_to_the_tail() {
        let nodes: Vec<_> = (0..20).map(node).collect();
        let base_filter: FilterHandle = Arc::new(All);
        let init = MultiInit(vec![Arc::new(RandomInit), Arc::new(RandomInit), Arc::new(RandomInit)]);
        let selector = init.init(&nodes, &base_filter);
        let excluded = HashSet::new();
        let call = SelectCall {
            placement: 0,
            requester: NodeId::from_bytes([99; NODE_ID_LEN]),
            n: 7,
            excluded: &excluded,
            already_selected: &[],
            cancel: &crate::context::CancellationToken::none(),
        };
        let result = selector.select(&call).expect("enough nodes");
        assert_eq!(result.len(), 7, "2+2+3 across three sub-selectors");
    }
}

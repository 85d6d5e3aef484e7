//! `filter(f, delegate)` — restrict the pool to nodes matching `f` before
//! delegating.
use std::sync::Arc;

use crate::filter::{And, FilterHandle};
use crate::node::SelectedNode;

use super::{NodeSelectorInit, SelectorHandle, SelectorInitHandle};

/// Narrows the effective base filter passed to `delegate` by `f`,
/// deferred to select-time the same way the placement's own base filter
/// is (so requester-dependent filters like `successfulAtLeastPercent`
/// still see the real requester).
pub struct FilterDelegateInit {
    /// The extra restriction applied ahead of `delegate`.
    pub filter: FilterHandle,
    /// The restricted candidate source.
    pub delegate: SelectorInitHandle,
}

impl NodeSelectorInit for FilterDelegateInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        let narrowed: FilterHandle = Arc::new(And(vec![base_filter.clone(), self.filter.clone()]));
        self.delegate.init(nodes, &narrowed)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::filter::{All, Country};
    use crate::node::{NodeId, NODE_ID_LEN};
    use crate::selector::{NodeSelector, SelectCall, random::RandomInit};
    use std::collections::HashSet;

    fn node(id: u8, country: &str) -> SelectedNode {
        SelectedNode {
            id: NodeId::from_bytes([id; NODE_ID_LEN]),
            address: String::new(),
            last_net: String::new(),
            last_ip_port: String::new(),
            country_code: country.into(),
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
    fn narrows_pool_before_delegate_runs() {
        let nodes = vec![node(1, "DE"), node(2, "DE"), node(3, "US"), node(4, "US")];
        let base_filter: FilterHandle = Arc::new(All);
        let de_only = Country::new(["DE"]);
        let init = FilterDelegateInit {
            filter: Arc::new(de_only),
            delegate: Arc::new(RandomInit),
        };
        let selector = init.init(&nodes, &base_filter);
        let excluded = HashSet::new();
        let call = SelectCall {
            placement: 0,
            requester: NodeId::from_bytes([99; NODE_ID_LEN]),
            n: 2,
            excluded: &excluded,
            already_selected: &[],
            cancel: &crate::context::CancellationToken::none(),
        };
        let result = selector.select(&call).expect("two DE nodes available");
        assert!(result.iter().all(|n| n.country_code == "DE"));
    }
}

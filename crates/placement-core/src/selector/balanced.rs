//! `balanced(attr[, filter])` — spread picks evenly across the groups
//! induced by `attr`, honoring pre-existing picks via `alreadySelected`.
use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::PlacementError;
use crate::filter::{And, FilterHandle};
use crate::node::{NodeAttribute, SelectedNode};

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, is_eligible};

/// Builds a [`BalancedSelector`] grouping the node pool by `attr`.
pub struct BalancedInit {
    /// The attribute defining the groups to balance across.
    pub attr: NodeAttribute,
    /// An additional filter restricting the pool, unioned with the
    /// placement's base filter.
    pub filter: Option<FilterHandle>,
}

impl NodeSelectorInit for BalancedInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        let filter: FilterHandle = match &self.filter {
            Some(extra) => Arc::new(And(vec![base_filter.clone(), extra.clone()])),
            None => base_filter.clone(),
        };
        Arc::new(BalancedSelector {
            nodes: nodes.to_vec(),
            attr: self.attr.clone(),
            filter,
        })
    }
}

/// Never returns more than `ceil(n / #groups)` from any one group when
/// supply permits.
pub struct BalancedSelector {
    nodes: Vec<SelectedNode>,
    attr: NodeAttribute,
    filter: FilterHandle,
}

impl BalancedSelector {
    fn select_with_rng(&self, call: &SelectCall<'_>, rng: &mut impl Rng) -> Result<Vec<SelectedNode>, PlacementError> {
        let already = call.already_selected_ids();
        let mut remaining: HashMap<String, Vec<&SelectedNode>> = HashMap::new();
        for node in &self.nodes {
            if is_eligible(node, &self.filter, call.requester, call.excluded, &already, &Default::default()) {
                remaining.entry(self.attr.apply(node)).or_default().push(node);
            }
        }
        for bucket in remaining.values_mut() {
            bucket.shuffle(rng);
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for node in call.already_selected {
            *counts.entry(self.attr.apply(node)).or_insert(0) += 1;
        }

        let num_groups = remaining.len().max(1);
        let cap = call.n.div_ceil(num_groups);

        let mut result = Vec::with_capacity(call.n);
        while result.len() < call.n {
            let available: Vec<&String> = remaining
                .iter()
                .filter(|(_, bucket)| !bucket.is_empty())
                .map(|(key, _)| key)
                .collect();
            if available.is_empty() {
                break;
            }
            let under_cap: Vec<&String> = available
                .iter()
                .filter(|key| counts.get(**key).copied().unwrap_or(0) < cap)
                .copied()
                .collect();
            let pool = if under_cap.is_empty() { &available } else { &under_cap };
            let Some(chosen_key) = pool.choose(rng).map(|k| (*k).clone()) else {
                break;
            };
            let Some(bucket) = remaining.get_mut(&chosen_key) else {
                break;
            };
            if let Some(node) = bucket.pop() {
                *counts.entry(chosen_key).or_insert(0) += 1;
                result.push(node.clone());
            }
        }

        if result.len() < call.n {
            return Err(call.insufficient(result.len()));
        }
        Ok(result)
    }
}

impl NodeSelector for BalancedSelector {
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
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn node(id: u8, group: &str) -> SelectedNode {
        SelectedNode {
            id: NodeId::from_bytes([id; NODE_ID_LEN]),
            address: String::new(),
            last_net: group.into(),
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
    fn caps_picks_per_group_when_supply_permits() {
        let mut nodes = Vec::new();
        for i in 0..4u8 {
            nodes.push(node(i, "a"));
        }
        for i in 4..8u8 {
            nodes.push(node(i, "b"));
        }
        let selector = BalancedSelector {
            nodes,
            attr: NodeAttribute::last_net(),
            filter: Arc::new(All),
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
        let mut rng = StdRng::seed_from_u64(3);
        let result = selector.select_with_rng(&call, &mut rng).expect("enough supply");
        let mut per_group: HashMap<String, usize> = HashMap::new();
        for node in &result {
            *per_group.entry(node.last_net.clone()).or_insert(0) += 1;
        }
        for count in per_group.values() {
            assert!(*count <= 2, "cap of ceil(4/2)=2 per group");
        }
    }
}

//! `topology(weight, "g1,g2,...", "attr1,attr2,...", filter)` — a
//! hierarchical Efraimidis–Spirakis sampler whose levels are attributes;
//! edge weights are leaf sampling keys summed up the tree, and
//! `splits[i]` picks that many children at level `i` before recursing.
use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use crate::error::PlacementError;
use crate::filter::FilterHandle;
use crate::node::{NodeAttribute, NodeValue, SelectedNode};

use super::weighted::sampling_key;
use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, is_eligible};

/// A tree node: either an internal branch keyed by one level's attribute
/// value, or a leaf holding a single candidate and its sampling key.
enum Branch {
    Internal(HashMap<String, Tree>),
    Leaf(SelectedNode),
}

struct Tree {
    /// The largest leaf key reachable through this subtree; used to order
    /// sibling branches when a level's split count is smaller than the
    /// number of distinct values present.
    key: f64,
    branch: Branch,
}

impl Tree {
    fn leaf(node: SelectedNode, key: f64) -> Self {
        Tree { key, branch: Branch::Leaf(node) }
    }

    /// Builds one level of the tree from a flat list of (node, key) pairs,
    /// grouping by `attrs[0]` and recursing on `attrs[1..]`.
    fn build(items: Vec<(SelectedNode, f64)>, attrs: &[NodeAttribute]) -> Self {
        let Some((attr, rest)) = attrs.split_first() else {
            return match items.into_iter().next() {
                Some((node, key)) => Tree::leaf(node, key),
                None => Tree { key: f64::NEG_INFINITY, branch: Branch::Internal(HashMap::new()) },
            };
        };

        let mut groups: HashMap<String, Vec<(SelectedNode, f64)>> = HashMap::new();
        for (node, key) in items {
            groups.entry(attr.apply(&node)).or_default().push((node, key));
        }

        let mut children = HashMap::new();
        let mut best_key = f64::NEG_INFINITY;
        for (value, members) in groups {
            let subtree = Tree::build(members, rest);
            best_key = best_key.max(subtree.key);
            children.insert(value, subtree);
        }

        Tree { key: best_key, branch: Branch::Internal(children) }
    }

    /// Picks `splits[0]` children at this level by descending key, taking
    /// the rest of `splits` into the recursion, until a leaf is reached.
    fn select(&self, splits: &[usize], into: &mut Vec<SelectedNode>, remaining: &mut usize) {
        if *remaining == 0 {
            return;
        }
        match &self.branch {
            Branch::Leaf(node) => {
                into.push(node.clone());
                *remaining -= 1;
            }
            Branch::Internal(children) => {
                let take = splits.first().copied().unwrap_or(children.len()).max(1);
                let next_splits = if splits.is_empty() { &[][..] } else { &splits[1..] };

                let mut ordered: Vec<&Tree> = children.values().collect();
                ordered.sort_by(|a, b| b.key.partial_cmp(&a.key).unwrap_or(std::cmp::Ordering::Equal));

                for subtree in ordered.into_iter().take(take) {
                    if *remaining == 0 {
                        break;
                    }
                    subtree.select(next_splits, into, remaining);
                }
            }
        }
    }
}

/// Builds a [`TopologySelector`] over the node pool.
pub struct TopologyInit {
    /// Per-leaf weight function feeding the sampling key.
    pub weight: NodeValue,
    /// How many children to descend into at each tree level.
    pub splits: Vec<usize>,
    /// The levels of the tree, outermost first.
    pub attrs: Vec<NodeAttribute>,
    /// An additional filter restricting the pool.
    pub filter: Option<FilterHandle>,
}

impl NodeSelectorInit for TopologyInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        let filter: FilterHandle = match &self.filter {
            Some(extra) => Arc::new(crate::filter::And(vec![base_filter.clone(), extra.clone()])),
            None => base_filter.clone(),
        };
        Arc::new(TopologySelector {
            nodes: nodes.to_vec(),
            weight: self.weight.clone(),
            splits: self.splits.clone(),
            attrs: self.attrs.clone(),
            filter,
        })
    }
}

/// Picks nodes by descending a weighted tree level by level: `splits[i]`
/// branches are explored at level `i`, ranked by their largest leaf
/// sampling key, recursing until a leaf is reached.
pub struct TopologySelector {
    nodes: Vec<SelectedNode>,
    weight: NodeValue,
    splits: Vec<usize>,
    attrs: Vec<NodeAttribute>,
    filter: FilterHandle,
}

impl TopologySelector {
    fn select_with_rng(&self, call: &SelectCall<'_>, rng: &mut impl Rng) -> Result<Vec<SelectedNode>, PlacementError> {
        let already = call.already_selected_ids();
        let items: Vec<(SelectedNode, f64)> = self
            .nodes
            .iter()
            .filter(|n| is_eligible(n, &self.filter, call.requester, call.excluded, &already, &Default::default()))
            .map(|n| {
                let weight = self.weight.apply(n);
                let u: f64 = rng.r#gen::<f64>().clamp(f64::MIN_POSITIVE, 1.0);
                (n.clone(), sampling_key(weight, u))
            })
            .collect();

        if items.is_empty() {
            return Err(call.insufficient(0));
        }

        let tree = Tree::build(items, &self.attrs);
        let mut result = Vec::with_capacity(call.n);
        let mut remaining = call.n;
        tree.select(&self.splits, &mut result, &mut remaining);

        if result.len() < call.n {
            return Err(call.insufficient(result.len()));
        }
        Ok(result)
    }
}

impl NodeSelector for TopologySelector {
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

    fn node(id: u8, country: &str, last_net: &str) -> SelectedNode {
        SelectedNode {
            id: NodeId::from_bytes([id; NODE_ID_LEN]),
            address: String::new(),
            last_net: last_net.into(),
            last_ip_port: String::new(),
            country_code: country.into(),
            continent: "Europe".into(),
            vetted: true,
            exiting: false,
            online: true,
            suspended: false,
            free_disk: u64::from(id),
            piece_count: 0,
            wallet: String::new(),
            email: String::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn picks_from_distinct_countries_before_recursing_into_subnets() {
        let nodes = vec![
            node(1, "DE", "a"),
            node(2, "DE", "b"),
            node(3, "FR", "c"),
            node(4, "FR", "d"),
            node(5, "PL", "e"),
            node(6, "PL", "f"),
        ];
        let base_filter: FilterHandle = Arc::new(All);
        let init = TopologyInit {
            weight: NodeValue::free_disk(),
            splits: vec![3, 1],
            attrs: vec![NodeAttribute::country(), NodeAttribute::last_net()],
            filter: None,
        };
        let selector = init.init(&nodes, &base_filter);
        let excluded = HashSet::new();
        let call = SelectCall {
            placement: 0,
            requester: NodeId::from_bytes([99; NODE_ID_LEN]),
            n: 3,
            excluded: &excluded,
            already_selected: &[],
            cancel: &crate::context::CancellationToken::none(),
        };
        let tsel = selector
            .select(&call)
            .unwrap_or_else(|_| panic!("unexpected error"));
        let countries: HashSet<_> = tsel.iter().map(|n| n.country_code.clone()).collect();
        assert_eq!(countries.len(), 3, "one node per country with three splits at the top level");
    }

    #[test]
    fn is_deterministic_under_a_seeded_rng() {
        let nodes = vec![node(1, "DE", "a"), node(2, "DE", "b"), node(3, "FR", "c")];
        let base_filter: FilterHandle = Arc::new(All);
        let selector = TopologySelector {
            nodes,
            weight: NodeValue::free_disk(),
            splits: vec![2],
            attrs: vec![NodeAttribute::country()],
            filter: base_filter,
        };
        let excluded = HashSet::new();
        let call = SelectCall {
            placement: 0,
            requester: NodeId::from_bytes([99; NODE_ID_LEN]),
            n: 2,
            excluded: &excluded,
            already_selected: &[],
            cancel: &crate::context::CancellationToken::none(),
        };
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        let a = selector.select_with_rng(&call, &mut rng_a).expect("enough nodes");
        let b = selector.select_with_rng(&call, &mut rng_b).expect("enough nodes");
        assert_eq!(a.iter().map(|n| n.id).collect::<Vec<_>>(), b.iter().map(|n| n.id).collect::<Vec<_>>());
    }
}

//! `attribute-group(attr)` — bucket nodes by `attr`, draw up to one node
//! per bucket, buckets visited in random order.
use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::PlacementError;
use crate::filter::FilterHandle;
use crate::node::{NodeAttribute, SelectedNode};

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, is_eligible};

/// Builds an [`AttributeGroupSelector`] bucketing the node pool by `attr`.
pub struct AttributeGroupInit {
    /// The attribute used to bucket nodes, e.g. `last_net` for subnet
    /// diversity.
    pub attr: NodeAttribute,
}

impl NodeSelectorInit for AttributeGroupInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        Arc::new(AttributeGroupSelector {
            nodes: nodes.to_vec(),
            attr: self.attr.clone(),
            filter: base_filter.clone(),
        })
    }
}

/// Guarantees diversity on `attr` by construction: at most one node per
/// distinct attribute value.
pub struct AttributeGroupSelector {
    nodes: Vec<SelectedNode>,
    attr: NodeAttribute,
    filter: FilterHandle,
}

impl AttributeGroupSelector {
    fn select_with_rng(&self, call: &SelectCall<'_>, rng: &mut impl Rng) -> Result<Vec<SelectedNode>, PlacementError> {
        let already = call.already_selected_ids();
        let mut groups: HashMap<String, Vec<&SelectedNode>> = HashMap::new();
        for node in &self.nodes {
            if is_eligible(node, &self.filter, call.requester, call.excluded, &already, &Default::default()) {
                groups.entry(self.attr.apply(node)).or_default().push(node);
            }
        }

        let mut keys: Vec<&String> = groups.keys().collect();
        keys.shuffle(rng);

        let mut result = Vec::with_capacity(call.n);
        for key in keys {
            if result.len() == call.n {
                break;
            }
            let bucket = &groups[key];
            if let Some(chosen) = bucket.choose(rng) {
                result.push((*chosen).clone());
            }
        }

        if result.len() < call.n {
            return Err(call.insufficient(result.len()));
        }
        Ok(result)
    }
}

impl NodeSelector for AttributeGroupSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        self.select_with_rng(call, &mut rand::thread_rng())
    }
}

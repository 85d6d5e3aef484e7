//! Selection-invariant checkers, shared between benchmarks (as cheap
//! sanity assertions around the hot loop) and integration tests.
use std::collections::HashSet;

use placement_core::{NodeAttribute, SelectedNode};

/// Checks that every selected node is drawn from `universe`, none appears
/// in `excluded`, none duplicates `already_selected`, and the result
/// contains no duplicate IDs.
pub fn check_selection_subset(
    universe: &[SelectedNode],
    selected: &[SelectedNode],
    excluded: &HashSet<placement_core::NodeId>,
    already_selected: &[SelectedNode],
) -> Result<(), String> {
    let universe_ids: HashSet<_> = universe.iter().map(|n| n.id).collect();
    let already_ids: HashSet<_> = already_selected.iter().map(|n| n.id).collect();
    let mut seen = HashSet::new();

    for node in selected {
        if !universe_ids.contains(&node.id) {
            return Err(format!("selected node {} is not in the input universe", node.id));
        }
        if excluded.contains(&node.id) {
            return Err(format!("selected node {} is in the excluded set", node.id));
        }
        if already_ids.contains(&node.id) {
            return Err(format!("selected node {} duplicates an already-selected node", node.id));
        }
        if !seen.insert(node.id) {
            return Err(format!("selected node {} appears twice in the result", node.id));
        }
    }
    Ok(())
}

/// Checks invariant 2: the result never exceeds the requested count.
pub fn check_not_over_requested(selected: &[SelectedNode], n: usize) -> Result<(), String> {
    if selected.len() > n {
        return Err(format!("selector returned {} nodes, more than the requested {n}", selected.len()));
    }
    Ok(())
}

/// Checks invariant 4: for an `attribute-group` selection, no two
/// selected nodes share the same `attr` value.
pub fn check_group_diversity(attr: &NodeAttribute, selected: &[SelectedNode]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for node in selected {
        let value = attr.apply(node);
        if !seen.insert(value.clone()) {
            return Err(format!("two selected nodes share {} = {value:?}", attr.name()));
        }
    }
    Ok(())
}

/// Checks invariant 5: for `clumping-by-attribute(attr, max_allowed)`,
/// the set of pieces *not* reported bad never has more than
/// `max_allowed` pieces sharing a non-empty `attr` value among their
/// owning nodes.
pub fn check_clumping_bound(
    attr: &NodeAttribute,
    pieces: &[i32],
    nodes: &[SelectedNode],
    bad: &HashSet<i32>,
    max_allowed: usize,
) -> Result<(), String> {
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for (piece, node) in pieces.iter().zip(nodes) {
        if bad.contains(piece) {
            continue;
        }
        let value = attr.apply(node);
        if value.is_empty() {
            continue;
        }
        let count = counts.entry(value.clone()).or_insert(0);
        *count += 1;
        if *count > max_allowed {
            return Err(format!("{} good pieces share {} = {value:?}, more than the allowed {max_allowed}", *count, attr.name()));
        }
    }
    Ok(())
}

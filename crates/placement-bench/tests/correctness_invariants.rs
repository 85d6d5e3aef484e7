//! End-to-end checks of the selection engine's testable properties
//! against generated fleets, using the correctness checkers every
//! benchmark also exercises as a cheap sanity net.
#![allow(clippy::expect_used)]

use std::collections::HashSet;
use std::sync::Arc;

use placement_bench::correctness::{check_group_diversity, check_not_over_requested, check_selection_subset};
use placement_bench::{SizeTier, generate_fleet};
use placement_core::context::CancellationToken;
use placement_core::expr::{Bindings, RuleKind, eval_source};
use placement_core::filter::All;
use placement_core::node::{NodeAttribute, NodeId};
use placement_core::selector::SelectCall;

fn selector_from(expr: &str) -> placement_core::SelectorInitHandle {
    let owned = Bindings::bare(RuleKind::Selector);
    let bindings = owned.as_bindings();
    eval_source(expr, &bindings).expect("should parse").into_selector(expr).expect("should be a selector")
}

#[test]
fn random_selection_honours_exclusion_and_already_selected() {
    let config = SizeTier::Small.config(11);
    let nodes = generate_fleet(&config);

    let selector_init = selector_from("random()");
    let base_filter = Arc::new(All);
    let selector = selector_init.init(&nodes, &base_filter);

    let excluded: HashSet<NodeId> = nodes.iter().take(5).map(|n| n.id).collect();
    let already_selected: Vec<_> = nodes.iter().skip(5).take(3).cloned().collect();
    let cancel = CancellationToken::none();

    let call = SelectCall {
        placement: 0,
        requester: NodeId::from_bytes([1; 32]),
        n: 20,
        excluded: &excluded,
        already_selected: &already_selected,
        cancel: &cancel,
    };
    let selected = selector.select(&call).expect("enough nodes");

    check_selection_subset(&nodes, &selected, &excluded, &already_selected).expect("subset invariant");
    check_not_over_requested(&selected, call.n).expect("count invariant");
}

#[test]
fn attribute_group_selection_never_repeats_a_group() {
    let config = SizeTier::Medium.config(21);
    let nodes = generate_fleet(&config);

    let selector_init = selector_from(r#"attributegroup("tag:dc")"#);
    let base_filter = Arc::new(All);
    let selector = selector_init.init(&nodes, &base_filter);

    let excluded = HashSet::new();
    let cancel = CancellationToken::none();
    let call = SelectCall {
        placement: 0,
        requester: NodeId::from_bytes([2; 32]),
        n: config.num_datacenters.min(nodes.len()),
        excluded: &excluded,
        already_selected: &[],
        cancel: &cancel,
    };
    let selected = selector.select(&call).expect("enough groups");

    let attr = NodeAttribute::parse("tag:dc").expect("valid attribute");
    check_group_diversity(&attr, &selected).expect("group diversity invariant");
    check_selection_subset(&nodes, &selected, &excluded, &[]).expect("subset invariant");
}

#[test]
fn balanced_selection_never_exceeds_the_requested_count() {
    let config = SizeTier::Small.config(33);
    let nodes = generate_fleet(&config);

    let selector_init = selector_from(r#"balanced("tag:rack")"#);
    let base_filter = Arc::new(All);
    let selector = selector_init.init(&nodes, &base_filter);

    let excluded = HashSet::new();
    let cancel = CancellationToken::none();
    let call = SelectCall {
        placement: 0,
        requester: NodeId::from_bytes([3; 32]),
        n: 40,
        excluded: &excluded,
        already_selected: &[],
        cancel: &cancel,
    };
    let selected = selector.select(&call).expect("enough nodes");
    check_not_over_requested(&selected, call.n).expect("count invariant");
    check_selection_subset(&nodes, &selected, &excluded, &[]).expect("subset invariant");
}

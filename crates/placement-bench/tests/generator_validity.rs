//! Sanity checks on the synthetic fleet generator itself: determinism,
//! requested cardinality, and attribute distributions landing within the
//! configured bounds.
#![allow(clippy::expect_used)]

use std::collections::HashSet;

use placement_bench::generator::FleetConfig;
use placement_bench::{SizeTier, generate_fleet};
use proptest::prelude::*;

#[test]
fn generation_is_deterministic_given_the_same_seed() {
    let config = SizeTier::Small.config(7);
    let a = generate_fleet(&config);
    let b = generate_fleet(&config);
    assert_eq!(a, b);
}

#[test]
fn different_seeds_produce_different_fleets() {
    let a = generate_fleet(&SizeTier::Small.config(1));
    let b = generate_fleet(&SizeTier::Small.config(2));
    assert_ne!(a, b);
}

#[test]
fn fleet_has_the_requested_node_count_and_unique_ids() {
    for tier in [SizeTier::Small, SizeTier::Medium, SizeTier::Large] {
        let config = tier.config(42);
        let nodes = generate_fleet(&config);
        assert_eq!(nodes.len(), config.num_nodes);
        let ids: HashSet<_> = nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids.len(), nodes.len(), "node ids should be unique");
    }
}

#[test]
fn subnets_cluster_within_the_configured_bound() {
    let config = SizeTier::Small.config(9);
    let nodes = generate_fleet(&config);
    let subnets: HashSet<_> = nodes.iter().map(|n| n.last_net.clone()).collect();
    assert!(subnets.len() <= config.num_subnets, "more distinct subnets than configured");
}

#[test]
fn every_node_carries_dc_rack_and_owner_tags() {
    let config = SizeTier::Small.config(3);
    let nodes = generate_fleet(&config);
    for node in &nodes {
        assert!(node.tag_value(None, "dc").is_some());
        assert!(node.tag_value(None, "rack").is_some());
        assert!(node.tag_value(None, "owner").is_some());
    }
}

#[test]
fn vetted_fraction_is_roughly_honoured() {
    let config = SizeTier::Medium.config(5);
    let nodes = generate_fleet(&config);
    let vetted = nodes.iter().filter(|n| n.vetted).count();
    let observed = vetted as f64 / nodes.len() as f64;
    assert!((observed - config.vetted_fraction).abs() < 0.05, "observed vetted fraction {observed} drifted too far from {}", config.vetted_fraction);
}

proptest! {
    /// For any seed and any requested fleet size, the generator produces
    /// exactly that many nodes, every one with a unique id.
    #[test]
    fn any_seed_and_size_yields_unique_ids(seed: u64, num_nodes in 1usize..500) {
        let config = FleetConfig {
            seed,
            num_nodes,
            num_subnets: (num_nodes / 3).max(1),
            num_datacenters: 8,
            num_racks: 32,
            num_operators: 64,
            vetted_fraction: 0.5,
        };
        let nodes = generate_fleet(&config);
        prop_assert_eq!(nodes.len(), num_nodes);
        let ids: HashSet<_> = nodes.iter().map(|n| n.id).collect();
        prop_assert_eq!(ids.len(), nodes.len());
    }
}

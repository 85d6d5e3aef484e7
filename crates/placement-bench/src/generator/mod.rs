//! Synthetic node-fleet generator.
//!
//! Produces `Vec<SelectedNode>` fleets with realistic attribute
//! distributions (country, subnet clustering, datacenter/rack tags,
//! vetted fraction) at a handful of size tiers, for benchmarking the
//! selector and expression-evaluator hot paths.

mod identifiers;
mod nodes;

use placement_core::SelectedNode;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Configuration for the fleet generator.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Seed for the random number generator (deterministic).
    pub seed: u64,
    /// Number of nodes to generate.
    pub num_nodes: usize,
    /// Number of distinct `last_net` subnets to draw from — lower than
    /// `num_nodes` so several nodes share a subnet, exercising subnet
    /// dedup and `clumping-by-attribute`.
    pub num_subnets: usize,
    /// Number of distinct `tag:dc` values.
    pub num_datacenters: usize,
    /// Number of distinct `tag:rack` values.
    pub num_racks: usize,
    /// Number of distinct `tag:owner` values.
    pub num_operators: usize,
    /// Fraction of nodes with `vetted = true`, in `[0, 1]`.
    pub vetted_fraction: f64,
}

/// Predefined size tiers for benchmarking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeTier {
    /// ~200 nodes — a small satellite or a development fleet.
    Small,
    /// ~5,000 nodes — a mid-size production fleet.
    Medium,
    /// ~50,000 nodes — a large production fleet.
    Large,
}

impl SizeTier {
    /// Returns the default [`FleetConfig`] for this size tier.
    pub fn config(self, seed: u64) -> FleetConfig {
        match self {
            SizeTier::Small => FleetConfig {
                seed,
                num_nodes: 200,
                num_subnets: 60,
                num_datacenters: 6,
                num_racks: 20,
                num_operators: 40,
                vetted_fraction: 0.8,
            },
            SizeTier::Medium => FleetConfig {
                seed,
                num_nodes: 5_000,
                num_subnets: 1_200,
                num_datacenters: 12,
                num_racks: 200,
                num_operators: 800,
                vetted_fraction: 0.8,
            },
            SizeTier::Large => FleetConfig {
                seed,
                num_nodes: 50_000,
                num_subnets: 10_000,
                num_datacenters: 24,
                num_racks: 1_500,
                num_operators: 6_000,
                vetted_fraction: 0.8,
            },
        }
    }
}

/// Generates a node fleet from `config`. All randomness is deterministic,
/// seeded from `config.seed`.
pub fn generate_fleet(config: &FleetConfig) -> Vec<SelectedNode> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    (0..config.num_nodes).map(|i| nodes::build_node(config, i, &mut rng)).collect()
}

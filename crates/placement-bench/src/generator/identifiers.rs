//! Deterministic node-id and subnet generation.
use placement_core::NodeId;
use rand::Rng;

/// Generates a fresh random [`NodeId`] from `rng`.
pub fn random_node_id(rng: &mut impl Rng) -> NodeId {
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    NodeId::from_bytes(bytes)
}

/// Generates a `last_net` subnet key with `num_subnets` distinct values,
/// so that repeated calls with the same `rng` produce realistic subnet
/// clustering (several nodes sharing a `/24`) instead of every node
/// living alone.
pub fn random_subnet(rng: &mut impl Rng, num_subnets: usize) -> String {
    let bucket = rng.gen_range(0..num_subnets.max(1));
    let a = (bucket / (256 * 256)) % 256;
    let b = (bucket / 256) % 256;
    let c = bucket % 256;
    format!("{a}.{b}.{c}")
}

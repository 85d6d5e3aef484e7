//! Builds a single [`SelectedNode`] with realistic, seeded attribute
//! distributions.
use placement_core::{NodeId, NodeTag, SelectedNode};
use rand::Rng;
use rand::seq::SliceRandom as _;

use super::identifiers::{random_node_id, random_subnet};
use super::FleetConfig;

const COUNTRIES: &[&str] = &["DE", "FR", "US", "JP", "BR", "IN", "NL", "PL", "RU", "CA", "AU", "ZA"];
const CONTINENTS: &[(&str, &[&str])] = &[
    ("Europe", &["DE", "FR", "NL", "PL", "RU"]),
    ("North America", &["US", "CA"]),
    ("Asia", &["JP", "IN"]),
    ("South America", &["BR"]),
    ("Oceania", &["AU"]),
    ("Africa", &["ZA"]),
];

fn continent_of(country: &str) -> &'static str {
    CONTINENTS
        .iter()
        .find(|(_, codes)| codes.contains(&country))
        .map_or("Europe", |(name, _)| name)
}

/// Builds one node, deriving its attributes from `index` and `rng` per
/// `config`'s distributions.
pub fn build_node(config: &FleetConfig, index: usize, rng: &mut impl Rng) -> SelectedNode {
    let id = random_node_id(rng);
    let country = COUNTRIES[index % COUNTRIES.len()];
    let last_net = random_subnet(rng, config.num_subnets);
    let last_ip_port = format!("{last_net}.{}:28967", rng.gen_range(1..255));
    let vetted = rng.gen_bool(config.vetted_fraction);
    let dc = format!("dc{}", index % config.num_datacenters.max(1));
    let rack = format!("rack{}", index % config.num_racks.max(1));
    let owner = format!("operator{}", index % config.num_operators.max(1));

    let signer = id;
    let mut tags = vec![
        tag(signer, id, "dc", dc.as_bytes()),
        tag(signer, id, "rack", rack.as_bytes()),
        tag(signer, id, "owner", owner.as_bytes()),
    ];
    tags.shuffle(rng);

    SelectedNode {
        id,
        address: last_ip_port.clone(),
        last_net,
        last_ip_port,
        country_code: country.to_string(),
        continent: continent_of(country).to_string(),
        vetted,
        exiting: false,
        online: true,
        suspended: false,
        free_disk: rng.gen_range(1_000_000_000..5_000_000_000_000),
        piece_count: rng.gen_range(0..100_000),
        wallet: format!("0x{index:040x}"),
        email: format!("operator{index}@example.com"),
        tags,
    }
}

fn tag(signer: NodeId, node_id: NodeId, name: &str, value: &[u8]) -> NodeTag {
    NodeTag {
        node_id,
        signer_id: signer,
        name: name.to_string(),
        value: value.to_vec(),
        signed_at: 0,
    }
}

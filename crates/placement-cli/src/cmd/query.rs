//! `placement query` — exercises `Match`, `MatchForUpload`, or `Select`
//! against a JSON node snapshot via the State Facade.
//!
//! `placement-core` knows nothing about JSON; parsing the snapshot into
//! [`SelectedNode`]s is this module's job, same division of labour as
//! [`crate::io`] owning every byte read from disk or stdin.
use std::collections::HashMap;
use std::str::FromStr as _;

use placement_core::context::CancellationToken;
use placement_core::node::NodeTag;
use placement_core::selector::SelectCall;
use placement_core::{NodeId, PlacementDefinitions, SelectedNode, load_config};
use serde_json::Value;

use crate::error::CliError;
use crate::format::{FormatMode, FormatterConfig, json_string};

/// Runs the `query` subcommand: loads `config_source` and `nodes_json`,
/// then either selects up to `select` nodes for `placement`, or tests
/// `Match`/`MatchForUpload` against every node in the snapshot.
pub fn run(
    config_source: &str,
    nodes_json: &str,
    placement: u16,
    requester: Option<&str>,
    select: Option<usize>,
    upload: bool,
    config: &FormatterConfig,
) -> Result<(), CliError> {
    let parsed = load_config(config_source)?;
    let success_trackers = HashMap::new();
    let failure_trackers = HashMap::new();
    let defs = PlacementDefinitions::build(&parsed, &success_trackers, &failure_trackers)?;

    let nodes = parse_nodes(nodes_json)?;
    let requester_id = match requester {
        Some(s) => NodeId::from_str(s).map_err(|e| CliError::InvalidNodes { detail: format!("bad --requester: {e}") })?,
        None => NodeId::from_bytes([0; 32]),
    };

    match select {
        Some(n) => run_select(&defs, &nodes, placement, requester_id, n, config),
        None => run_match(&defs, &nodes, placement, requester_id, upload, config),
    }
}

fn run_select(
    defs: &PlacementDefinitions,
    nodes: &[SelectedNode],
    placement: u16,
    requester: NodeId,
    n: usize,
    config: &FormatterConfig,
) -> Result<(), CliError> {
    let snapshot = defs.snapshot(nodes);
    let excluded = std::collections::HashSet::new();
    let cancel = CancellationToken::none();
    let call = SelectCall {
        placement,
        requester,
        n,
        excluded: &excluded,
        already_selected: &[],
        cancel: &cancel,
    };
    let selected = snapshot.select(&call)?;

    match config.mode {
        FormatMode::Human => {
            if !config.quiet {
                println!("selected {} of {n} requested", selected.len());
                for node in &selected {
                    println!("  {}", node.id.to_hex());
                }
            }
        }
        FormatMode::Json => {
            let ids: Vec<String> = selected.iter().map(|node| json_string(&node.id.to_hex())).collect();
            println!(r#"{{"requested":{n},"selected":{}}}"#, crate::format::json_array(ids));
        }
    }
    Ok(())
}

fn run_match(
    defs: &PlacementDefinitions,
    nodes: &[SelectedNode],
    placement: u16,
    requester: NodeId,
    upload: bool,
    config: &FormatterConfig,
) -> Result<(), CliError> {
    let results: Vec<(NodeId, bool)> = nodes
        .iter()
        .map(|node| {
            let matched = if upload { defs.match_for_upload(placement, requester, node) } else { defs.match_node(placement, requester, node) };
            (node.id, matched)
        })
        .collect();

    match config.mode {
        FormatMode::Human => {
            if !config.quiet {
                for (id, matched) in &results {
                    println!("{} {}", id.to_hex(), if *matched { "match" } else { "no-match" });
                }
            }
        }
        FormatMode::Json => {
            let entries: Vec<String> =
                results.iter().map(|(id, matched)| format!(r#"{{"id":{},"matched":{matched}}}"#, json_string(&id.to_hex()))).collect();
            println!("{}", crate::format::json_array(entries));
        }
    }
    Ok(())
}

/// Parses a JSON array of node objects into [`SelectedNode`]s.
fn parse_nodes(text: &str) -> Result<Vec<SelectedNode>, CliError> {
    let value: Value = serde_json::from_str(text).map_err(|e| CliError::InvalidNodes { detail: format!("invalid JSON: {e}") })?;
    let Value::Array(items) = value else {
        return Err(CliError::InvalidNodes { detail: "node snapshot must be a JSON array".to_string() });
    };
    items.iter().map(parse_node).collect()
}

fn parse_node(value: &Value) -> Result<SelectedNode, CliError> {
    let field = |name: &str| -> Result<&str, CliError> {
        value
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| CliError::InvalidNodes { detail: format!("node missing string field {name:?}") })
    };
    let bool_field = |name: &str, default: bool| -> bool { value.get(name).and_then(Value::as_bool).unwrap_or(default) };
    let uint_field = |name: &str| -> u64 { value.get(name).and_then(Value::as_u64).unwrap_or(0) };
    let int_field = |name: &str| -> i64 { value.get(name).and_then(Value::as_i64).unwrap_or(0) };

    let id = NodeId::from_str(field("id")?).map_err(|e| CliError::InvalidNodes { detail: format!("bad node id: {e}") })?;

    let tags = match value.get("tags") {
        Some(Value::Array(items)) => items.iter().map(|t| parse_tag(t, id)).collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(CliError::InvalidNodes { detail: "node \"tags\" must be an array".to_string() }),
        None => Vec::new(),
    };

    Ok(SelectedNode {
        id,
        address: field("address").unwrap_or_default().to_string(),
        last_net: field("last_net").unwrap_or_default().to_string(),
        last_ip_port: field("last_ip_port").unwrap_or_default().to_string(),
        country_code: field("country_code").unwrap_or_default().to_string(),
        continent: field("continent").unwrap_or_default().to_string(),
        vetted: bool_field("vetted", false),
        exiting: bool_field("exiting", false),
        online: bool_field("online", true),
        suspended: bool_field("suspended", false),
        free_disk: uint_field("free_disk"),
        piece_count: int_field("piece_count"),
        wallet: field("wallet").unwrap_or_default().to_string(),
        email: field("email").unwrap_or_default().to_string(),
        tags,
    })
}

fn parse_tag(value: &Value, node_id: NodeId) -> Result<NodeTag, CliError> {
    let signer_id = match value.get("signer_id").and_then(Value::as_str) {
        Some(s) => NodeId::from_str(s).map_err(|e| CliError::InvalidNodes { detail: format!("bad tag signer_id: {e}") })?,
        None => node_id,
    };
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| CliError::InvalidNodes { detail: "tag missing \"name\"".to_string() })?
        .to_string();
    let value_str = value.get("value").and_then(Value::as_str).unwrap_or_default();
    let signed_at = value.get("signed_at").and_then(Value::as_i64).unwrap_or(0);

    Ok(NodeTag {
        node_id,
        signer_id,
        name,
        value: value_str.as_bytes().to_vec(),
        signed_at,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    fn human(quiet: bool) -> FormatterConfig {
        FormatterConfig {
            mode: FormatMode::Human,
            colors: false,
            quiet,
        }
    }

    fn sample_nodes() -> &'static str {
        r#"[
            {"id": "0000000000000000000000000000000000000000000000000000000000000001", "address": "1.2.3.4:7777", "last_net": "1.2.3", "country_code": "DE", "continent": "Europe", "vetted": true, "free_disk": 5000000000, "piece_count": 10},
            {"id": "0000000000000000000000000000000000000000000000000000000000000002", "address": "5.6.7.8:7777", "last_net": "5.6.7", "country_code": "US", "continent": "North America", "vetted": false, "free_disk": 1000000000, "piece_count": 2}
        ]"#
    }

    #[test]
    fn match_against_default_placement_matches_every_node() {
        assert!(run("", sample_nodes(), 0, None, None, false, &human(true)).is_ok());
    }

    #[test]
    fn select_returns_ok_even_when_under_requested_count() {
        assert!(run("", sample_nodes(), 0, None, Some(1), false, &human(true)).is_ok());
    }

    #[test]
    fn malformed_node_snapshot_is_an_error() {
        let err = run("", "not json", 0, None, None, false, &human(true)).expect_err("should fail");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn bad_requester_id_is_an_error() {
        let err = run("", sample_nodes(), 0, Some("not-a-valid-id"), None, false, &human(true)).expect_err("should fail");
        assert_eq!(err.exit_code(), 2);
    }
}

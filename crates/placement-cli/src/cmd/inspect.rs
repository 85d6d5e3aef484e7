//! `placement inspect` — prints a summary of every compiled placement (or
//! one, via `--id`): its filter/selector/invariant/download-selector and
//! any erasure-coding overrides.
use std::collections::HashMap;

use placement_core::{PlacementDefinitions, load_config};

use crate::error::CliError;
use crate::format::{FormatMode, FormatterConfig, json_string};

/// Prints a summary of the placement(s) compiled from `config_source`.
pub fn run(config_source: &str, id: Option<u16>, config: &FormatterConfig) -> Result<(), CliError> {
    let parsed = load_config(config_source)?;
    let success_trackers = HashMap::new();
    let failure_trackers = HashMap::new();
    let defs = PlacementDefinitions::build(&parsed, &success_trackers, &failure_trackers)?;

    let mut ids: Vec<u16> = match id {
        Some(one) => vec![one],
        None => parsed.rules.iter().map(|r| r.id).collect(),
    };
    ids.sort_unstable();
    ids.dedup();

    match config.mode {
        FormatMode::Human => {
            for id in ids {
                let Some(placement) = defs.get(id) else {
                    println!("placement {id}: not found");
                    continue;
                };
                println!("placement {id}{}", placement.name.as_deref().map_or(String::new(), |n| format!(" ({n})")));
                println!(
                    "  filter:            {}",
                    placement.filter.canonical().unwrap_or_else(|| "<custom>".to_string())
                );
                println!(
                    "  upload-filter:     {}",
                    placement.upload_filter.canonical().unwrap_or_else(|| "<custom>".to_string())
                );
                println!("  has cohort tree:   {}", placement.cohort_requirements.is_some());
                if let Some(ec) = &placement.ec {
                    println!("  ec:                minimum={} total={}", ec.minimum, ec.total);
                }
            }
        }
        FormatMode::Json => {
            let entries: Vec<String> = ids
                .into_iter()
                .map(|id| match defs.get(id) {
                    Some(p) => format!(
                        r#"{{"id":{id},"name":{},"filter":{},"upload_filter":{},"has_cohort":{},"ec":{}}}"#,
                        p.name.as_deref().map_or("null".to_string(), |n| json_string(n)),
                        p.filter.canonical().map_or("null".to_string(), |c| json_string(&c)),
                        p.upload_filter.canonical().map_or("null".to_string(), |c| json_string(&c)),
                        p.cohort_requirements.is_some(),
                        p.ec.as_ref().map_or("null".to_string(), |ec| format!(r#"{{"minimum":{},"total":{}}}"#, ec.minimum, ec.total)),
                    ),
                    None => format!(r#"{{"id":{id},"found":false}}"#),
                })
                .collect();
            println!("{}", crate::format::json_array(entries));
        }
    }

    Ok(())
}

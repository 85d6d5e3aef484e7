//! `placement convert` — re-serializes a loaded placement config between
//! the full YAML schema and the legacy `id:expr;id:expr` string form.
use placement_core::config::{EcField, RuleSpec};
use placement_core::load_config;

use crate::cli::TargetEncoding;
use crate::error::CliError;
use crate::format::FormatterConfig;

/// Loads `config_source` and prints it re-serialized as `to`.
pub fn run(config_source: &str, to: TargetEncoding, config: &FormatterConfig) -> Result<(), CliError> {
    let parsed = load_config(config_source)?;
    let mut rules: Vec<RuleSpec> = parsed.rules;
    rules.sort_by_key(|r| r.id);

    let rendered = match to {
        TargetEncoding::Yaml => to_yaml(&rules),
        TargetEncoding::Legacy => to_legacy(&rules, config.quiet),
    };

    if !config.quiet {
        println!("{rendered}");
    }
    Ok(())
}

fn to_yaml(rules: &[RuleSpec]) -> String {
    let mut out = String::from("placements:\n");
    for rule in rules {
        out.push_str(&format!("  - id: {}\n", rule.id));
        if let Some(name) = &rule.name {
            out.push_str(&format!("    name: {name:?}\n"));
        }
        if let Some(filter) = &rule.filter {
            out.push_str(&format!("    filter: {filter}\n"));
        }
        if let Some(upload_filter) = &rule.upload_filter {
            out.push_str(&format!("    upload-filter: {upload_filter}\n"));
        }
        if let Some(invariant) = &rule.invariant {
            out.push_str(&format!("    invariant: {invariant}\n"));
        }
        if let Some(selector) = &rule.selector {
            out.push_str(&format!("    selector: {selector}\n"));
        }
        if let Some(download_selector) = &rule.download_selector {
            out.push_str(&format!("    download-selector: {download_selector}\n"));
        }
        if let Some(cohort_requirements) = &rule.cohort_requirements {
            out.push_str(&format!("    cohort-requirements: {cohort_requirements}\n"));
        }
        if let Some(ec) = &rule.ec {
            out.push_str("    ec:\n");
            out.push_str(&format!("      minimum: {}\n", ec.minimum));
            out.push_str(&format!("      total: {}\n", ec.total));
            out.push_str(&format!("      success: {}\n", ec_field_to_yaml(&ec.success)));
            out.push_str(&format!("      repair: {}\n", ec_field_to_yaml(&ec.repair)));
        }
    }
    out
}

fn ec_field_to_yaml(field: &EcField) -> String {
    match field {
        EcField::Literal(v) => v.to_string(),
        EcField::PlusOffset(n) => format!("\"+{n}\""),
    }
}

/// Renders `rules` in the legacy `id:expr;id:expr` form, which can only
/// carry a node filter. Rules whose `filter` is unset are dropped; rules
/// that also set `selector`/`invariant`/etc. lose those fields, with a
/// warning unless `quiet`.
fn to_legacy(rules: &[RuleSpec], quiet: bool) -> String {
    let entries: Vec<String> = rules
        .iter()
        .filter_map(|rule| {
            let filter = rule.filter.as_ref()?;
            Some(format!("{}:{filter}", rule.id))
        })
        .collect();

    let dropped = rules
        .iter()
        .filter(|rule| rule.filter.is_some() && (rule.selector.is_some() || rule.invariant.is_some() || rule.download_selector.is_some() || rule.cohort_requirements.is_some() || rule.ec.is_some()))
        .count();
    if dropped > 0 && !quiet {
        eprintln!("warning: legacy form only carries a node filter; {dropped} rule(s) lost selector/invariant/ec fields");
    }

    entries.join(";")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    fn human(quiet: bool) -> FormatterConfig {
        FormatterConfig {
            mode: crate::format::FormatMode::Human,
            colors: false,
            quiet,
        }
    }

    #[test]
    fn default_config_converts_to_yaml() {
        assert!(run("", TargetEncoding::Yaml, &human(true)).is_ok());
    }

    #[test]
    fn default_config_converts_to_legacy() {
        assert!(run("", TargetEncoding::Legacy, &human(true)).is_ok());
    }

    #[test]
    fn legacy_override_round_trips_through_yaml() {
        assert!(run(r#"9:country("DE")"#, TargetEncoding::Yaml, &human(true)).is_ok());
    }

    #[test]
    fn to_legacy_drops_rules_with_no_filter() {
        let rules = vec![RuleSpec {
            id: 1,
            name: None,
            filter: None,
            upload_filter: None,
            invariant: None,
            selector: Some("random()".to_string()),
            download_selector: None,
            cohort_requirements: None,
            ec: None,
        }];
        assert_eq!(to_legacy(&rules, true), "");
    }

    #[test]
    fn ec_field_renders_literal_and_offset() {
        assert_eq!(ec_field_to_yaml(&EcField::Literal(29)), "29");
        assert_eq!(ec_field_to_yaml(&EcField::PlusOffset(10)), "\"+10\"");
    }
}

//! `placement validate` — loads and compiles a placement config, reporting
//! success or the first compile error encountered.
use std::collections::HashMap;

use placement_core::{PlacementDefinitions, load_config};

use crate::error::CliError;
use crate::format::{FormatMode, FormatterConfig, colorize, json_string};

/// Loads, compiles, and reports on `config_source`.
pub fn run(config_source: &str, config: &FormatterConfig) -> Result<(), CliError> {
    let parsed = load_config(config_source)?;
    let rule_count = parsed.rules.len();

    let success_trackers = HashMap::new();
    let failure_trackers = HashMap::new();
    let built = PlacementDefinitions::build(&parsed, &success_trackers, &failure_trackers);

    match built {
        Ok(_) => {
            if config.quiet {
                return Ok(());
            }
            match config.mode {
                FormatMode::Human => {
                    println!("{} {rule_count} placement(s) compiled", colorize("ok", true, config));
                }
                FormatMode::Json => {
                    println!(r#"{{"ok":true,"placements":{rule_count}}}"#);
                }
            }
            Ok(())
        }
        Err(e) => {
            if !config.quiet {
                match config.mode {
                    FormatMode::Human => {
                        println!("{} {e}", colorize("failed", false, config));
                    }
                    FormatMode::Json => {
                        println!(r#"{{"ok":false,"error":{}}}"#, json_string(&e.to_string()));
                    }
                }
            }
            Err(CliError::Placement(e))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    fn human() -> FormatterConfig {
        FormatterConfig {
            mode: FormatMode::Human,
            colors: false,
            quiet: true,
        }
    }

    #[test]
    fn default_config_validates_cleanly() {
        assert!(run("", &human()).is_ok());
    }

    #[test]
    fn legacy_override_validates() {
        assert!(run(r#"9:country("DE")"#, &human()).is_ok());
    }

    #[test]
    fn forward_reference_fails_validation() {
        let yaml = r#"
placements:
  - id: 1
    filter: placement(2)
  - id: 2
    filter: country("DE")
"#;
        let err = run(yaml, &human()).expect_err("should fail to compile");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = run("placements: [", &human()).expect_err("should fail to parse");
        assert_eq!(err.exit_code(), 1);
    }
}

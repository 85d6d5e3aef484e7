//! Integration tests for the `placement` binary's subcommands, run as a
//! subprocess so the full clap/io/format wiring is exercised end to end.
#![allow(clippy::expect_used)]

use std::path::PathBuf;
use std::process::Command;

/// Path to the compiled `placement` binary.
fn placement_bin() -> PathBuf {
    let mut path = std::env::current_exe().expect("current exe");
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("placement");
    path
}

#[test]
fn validate_default_config_exits_0() {
    let out = Command::new(placement_bin()).args(["validate", ""]).output().expect("run placement validate");
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));
}

#[test]
fn validate_forward_reference_exits_1() {
    let yaml = r#"
placements:
  - id: 1
    filter: placement(2)
  - id: 2
    filter: country("DE")
"#;
    let out = Command::new(placement_bin()).args(["validate", yaml]).output().expect("run placement validate");
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn inspect_default_config_lists_six_placements() {
    let out = Command::new(placement_bin())
        .args(["inspect", "", "--format", "json"])
        .output()
        .expect("run placement inspect");
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("\"id\":0"), "stdout: {stdout}");
    assert!(stdout.contains("\"id\":5"), "stdout: {stdout}");
}

#[test]
fn convert_default_config_to_legacy_prints_semicolon_joined_rules() {
    let out = Command::new(placement_bin())
        .args(["convert", "", "--to", "legacy"])
        .output()
        .expect("run placement convert");
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("0:all()"), "stdout: {stdout}");
}

#[test]
fn query_match_against_default_placement_reports_every_node() {
    let nodes = r#"[{"id":"0000000000000000000000000000000000000000000000000000000000000001","address":"1.2.3.4:7777","last_net":"1.2.3","country_code":"DE","continent":"Europe","vetted":true,"free_disk":5000000000,"piece_count":10}]"#;
    let out = Command::new(placement_bin())
        .args(["query", "--config", "", "--nodes", "-", "--placement", "0", "--format", "json"])
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .and_then(|mut child| {
            use std::io::Write as _;
            child.stdin.take().expect("stdin").write_all(nodes.as_bytes())?;
            child.wait_with_output()
        })
        .expect("run placement query");
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("\"matched\":true"), "stdout: {stdout}");
}

#[test]
fn query_with_malformed_node_snapshot_exits_2() {
    let out = Command::new(placement_bin())
        .args(["query", "--config", "", "--nodes", "-", "--placement", "0"])
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .and_then(|mut child| {
            use std::io::Write as _;
            child.stdin.take().expect("stdin").write_all(b"not json")?;
            child.wait_with_output()
        })
        .expect("run placement query");
    assert_eq!(out.status.code(), Some(2));
}

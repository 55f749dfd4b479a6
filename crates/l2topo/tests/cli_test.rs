//! Integration tests for the `l2topo` CLI binary.
//!
//! Argument parsing, config handling, and error exits run without any
//! device. `probe` and `watch` run against wiremock device agents.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `l2topo` binary with env isolation.
///
/// Clears `L2TOPO_*` variables and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn l2topo_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("l2topo");
    cmd.env("HOME", "/tmp/l2topo-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/l2topo-cli-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("L2TOPO_CONFIG")
        .env_remove("L2TOPO_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

fn device_document(
    chassis: &str,
    name: &str,
    port: &str,
    peer: &str,
    peer_port: &str,
) -> serde_json::Value {
    json!({
        "chassis_id": chassis,
        "name": name,
        "ports": [
            { "number": 1, "id": port,
              "neighbor": { "chassis_id": peer, "port_id": peer_port } },
            { "number": 2, "id": "unused" }
        ]
    })
}

async fn agent(document: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lldp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(&server)
        .await;
    server
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = l2topo_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    l2topo_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("topology")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("probe"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    l2topo_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("l2topo"));
}

#[test]
fn test_invalid_subcommand() {
    let output = l2topo_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    l2topo_cmd()
        .args(["--output", "xml", "config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("possible values"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    l2topo_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    l2topo_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    l2topo_cmd()
        .args(["--config", "/etc/l2topo/custom.toml", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/etc/l2topo/custom.toml"));
}

#[test]
fn test_config_show_without_file_prints_defaults() {
    l2topo_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cycle_secs = 60"));
}

#[test]
fn test_config_show_masks_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
        [devices.sw1]
        url = "http://10.0.0.1/lldp"
        token = "hunter2"
        "#,
    );

    l2topo_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2").not().and(predicate::str::contains("sw1")));
}

#[test]
fn test_config_show_as_json() {
    let output = l2topo_cmd()
        .args(["--output", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["reconciler"]["stale_after_cycles"], 3);
}

#[test]
fn test_env_overrides_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[reconciler]\ngrace_cycles = 4\n");

    l2topo_cmd()
        .arg("--config")
        .arg(&path)
        .env("L2TOPO_RECONCILER__GRACE_CYCLES", "7")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("grace_cycles = 7"));
}

#[test]
fn test_set_token_rejects_unknown_device() {
    l2topo_cmd()
        .args(["config", "set-token", "nope"])
        .write_stdin("abc\n")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not found"));
}

// ── Error exits ─────────────────────────────────────────────────────

#[test]
fn test_watch_without_devices() {
    l2topo_cmd()
        .args(["watch", "--cycles", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No devices configured"));
}

#[test]
fn test_probe_unknown_device() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[devices.sw1]\nurl = \"http://10.0.0.1/lldp\"\n");

    l2topo_cmd()
        .arg("--config")
        .arg(&path)
        .args(["probe", "sw9"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("sw1"));
}

#[test]
fn test_missing_token_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
        [devices.sw1]
        url = "http://10.0.0.1/lldp"
        token_env = "L2TOPO_TEST_TOKEN_NEVER_SET"
        "#,
    );

    l2topo_cmd()
        .arg("--config")
        .arg(&path)
        .args(["probe", "sw1"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("L2TOPO_TEST_TOKEN_NEVER_SET"));
}

// ── Against device agents ───────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_probe_prints_port_table() {
    let server = agent(device_document("aa:aa", "sw1", "ge-1", "bb:bb", "ge-2")).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        &format!("[devices.sw1]\nurl = \"{}/lldp\"\n", server.uri()),
    );

    let output = tokio::task::spawn_blocking(move || {
        l2topo_cmd()
            .arg("--config")
            .arg(&path)
            .args(["probe", "sw1"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sw1 (aa:aa)"));
    assert!(stdout.contains("ge-1") && stdout.contains("bb:bb"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_probe_reports_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        &format!("[devices.sw1]\nurl = \"{}/lldp\"\n", server.uri()),
    );

    let output = tokio::task::spawn_blocking(move || {
        l2topo_cmd()
            .arg("--config")
            .arg(&path)
            .args(["probe", "sw1"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert_eq!(output.status.code(), Some(3));
    assert!(combined_output(&output).contains("HTTP 401"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_watch_confirms_mutual_link() {
    let sw1 = agent(device_document("aa:aa", "sw1", "ge-1", "bb:bb", "ge-2")).await;
    let sw2 = agent(device_document("bb:bb", "sw2", "ge-2", "aa:aa", "ge-1")).await;
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        &format!(
            "[reconciler]\ncycle_secs = 1\n\n\
             [defaults]\ninterval = 1\n\n\
             [devices.sw1]\nurl = \"{}/lldp\"\n\n\
             [devices.sw2]\nurl = \"{}/lldp\"\n",
            sw1.uri(),
            sw2.uri()
        ),
    );

    let output = tokio::task::spawn_blocking(move || {
        l2topo_cmd()
            .arg("--config")
            .arg(&path)
            .args(["--output", "json", "watch", "--cycles", "2", "--final-only"])
            .timeout(std::time::Duration::from_secs(30))
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["nodes"], 2);
    let links = report["links"].as_array().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["confirmation"], "bidirectional");
    assert_eq!(report["stats"]["cycle"], 2);
}

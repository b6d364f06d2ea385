//! End-to-end tests for `vmkit ports`.

#![cfg(target_os = "linux")]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::net::TcpListener;
use tempfile::TempDir;

fn vmkit(config_home: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("vmkit");
    cmd.env_remove("VMKIT_CONFIG")
        .env("XDG_CONFIG_HOME", config_home.path())
        .arg("--no-color");
    cmd
}

/// A port nothing listens on right now.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn free_port_reports_free_and_exits_zero() {
    let dir = TempDir::new().unwrap();
    let port = free_port();
    vmkit(&dir)
        .args(["ports", "-y", "-p", &port.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Port {port}: free")))
        .stdout(predicate::str::contains("Checked 1 port(s): 1 free"));
}

#[test]
fn json_report_for_free_port() {
    let dir = TempDir::new().unwrap();
    let port = free_port();
    let output = vmkit(&dir)
        .args(["ports", "--json", "-p", &port.to_string()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(doc["run_id"].as_str().unwrap().starts_with("run-"));
    assert_eq!(doc["ports"][0]["port"], port);
    assert_eq!(doc["ports"][0]["status"], "free");
    assert_eq!(doc["summary"]["checked"], 1);
    assert_eq!(doc["summary"]["free"], 1);
}

#[test]
fn list_reports_listener_without_killing() {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    vmkit(&dir)
        .args(["ports", "--list", "-p", &port.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Port {port}: in use")))
        .stdout(predicate::str::contains(std::process::id().to_string()));

    // still ours
    assert!(listener.local_addr().is_ok());
    assert!(TcpListener::bind(("127.0.0.1", port)).is_err());
}

#[test]
fn declined_prompt_skips_port() {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    // stdin is not a terminal, so the [y/N] prompt takes its default
    vmkit(&dir)
        .args(["ports", "-p", &port.to_string()])
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped"));
    drop(listener);
}

#[test]
fn configured_families_are_scanned() {
    let dir = TempDir::new().unwrap();
    let base = free_port().saturating_sub(2).max(1024);
    let config = dir.path().join("vmkit.toml");
    std::fs::write(
        &config,
        format!("[ports]\nbase_ports = [{base}]\ndefault_range = 1\n"),
    )
    .unwrap();

    let output = vmkit(&dir)
        .arg("--config")
        .arg(&config)
        .args(["ports", "--list", "--json", "-r", "3"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ports: Vec<u64> = doc["ports"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["port"].as_u64().unwrap())
        .collect();
    let base = u64::from(base);
    assert_eq!(ports, vec![base, base + 1, base + 2]);
}

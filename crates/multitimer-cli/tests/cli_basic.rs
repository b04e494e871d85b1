//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary home directory
//! and checks the JSON it prints.

use std::path::Path;
use std::process::Command;

use serde_json::Value;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_multitimer"))
        .args(args)
        .env("HOME", home)
        .env_remove("MULTITIMER_ENV")
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(home: &Path, args: &[&str]) -> Value {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn create_list_and_show() {
    let home = tempfile::tempdir().unwrap();
    let created = run_json(
        home.path(),
        &[
            "timer", "create", "--name", "Essay", "--interval", "Draft:work:50m",
            "--interval", "break:10m", "--cycles", "2", "--project", "Writing",
        ],
    );
    assert_eq!(created["name"], "Essay");
    assert_eq!(created["status"], "stopped");
    assert_eq!(created["remaining"], "50:00");
    assert_eq!(created["cycle_label"], "1/2");

    let id = created["id"].as_str().unwrap().to_string();
    let listed = run_json(home.path(), &["timer", "list"]);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let shown = run_json(home.path(), &["timer", "show", &id[..8]]);
    assert_eq!(shown["id"], id.as_str());
    assert_eq!(shown["project"], "Writing");
}

#[test]
fn start_pause_stop() {
    let home = tempfile::tempdir().unwrap();
    let created = run_json(home.path(), &["timer", "create"]);
    let id = created["id"].as_str().unwrap().to_string();

    assert_eq!(run_json(home.path(), &["timer", "start", &id])["status"], "running");
    assert_eq!(run_json(home.path(), &["timer", "show", &id])["status"], "running");
    assert_eq!(run_json(home.path(), &["timer", "pause", &id])["status"], "paused");
    let stopped = run_json(home.path(), &["timer", "stop", &id]);
    assert_eq!(stopped["status"], "stopped");
    assert_eq!(stopped["remaining"], "25:00");
}

#[test]
fn edit_and_delete() {
    let home = tempfile::tempdir().unwrap();
    let id = run_json(home.path(), &["timer", "create"])["id"]
        .as_str()
        .unwrap()
        .to_string();
    let edited = run_json(
        home.path(),
        &["timer", "edit", &id, "--name", "Sprint", "--interval", "Go:work:90s"],
    );
    assert_eq!(edited["name"], "Sprint");
    assert_eq!(edited["remaining"], "01:30");

    let (_, _, code) = run_cli(home.path(), &["timer", "delete", &id]);
    assert_eq!(code, 0);
    let listed = run_json(home.path(), &["timer", "list"]);
    assert!(listed.as_array().unwrap().is_empty());
}

#[test]
fn invalid_input_fails() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["timer", "create", "--interval", "Nap:sleep:5m"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("kind"));

    let (_, _, code) = run_cli(home.path(), &["timer", "create", "--cycles", "0"]);
    assert_eq!(code, 1);

    let (_, stderr, code) = run_cli(home.path(), &["timer", "start", "missing"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Unknown timer"));
}

#[test]
fn config_get_set() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "defaults.work_minutes"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "25");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "defaults.work_minutes", "50"]);
    assert_eq!(code, 0);
    let created = run_json(home.path(), &["timer", "create"]);
    assert_eq!(created["remaining"], "50:00");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "engine.bogus", "1"]);
    assert_eq!(code, 1);
}

#[test]
fn goals_show_in_week_report() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(home.path(), &["goal", "set", "Reading", "4"]);
    assert_eq!(code, 0);
    let goals = run_json(home.path(), &["goal", "list"]);
    assert_eq!(goals["Reading"], 4.0);

    let report = run_json(home.path(), &["week", "--date", "2024-03-06"]);
    assert_eq!(report["week_start"], "2024-03-04");
    assert_eq!(report["entries"][0]["project"], "Reading");
    assert_eq!(report["entries"][0]["seconds"], 0);

    let (_, _, code) = run_cli(home.path(), &["goal", "unset", "Reading"]);
    assert_eq!(code, 0);
    let (_, _, code) = run_cli(home.path(), &["goal", "unset", "Reading"]);
    assert_eq!(code, 1);
}

#[test]
fn completions_print_script() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["completions", "bash"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("multitimer"));
}

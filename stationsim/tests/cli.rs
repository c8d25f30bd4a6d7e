// The cargo_bin! macro requires build script setup that's overkill for simple tests.
// Suppress deprecation warning on the function until we need custom build-dir support.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

const SCENARIO: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../scenarios/coal_line.json");

#[test]
fn test_help_flag() {
    Command::cargo_bin("stationsim")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--ticks"));
}

#[test]
fn test_missing_scenario_fails() {
    Command::cargo_bin("stationsim")
        .unwrap()
        .arg("/nonexistent/scenario.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read scenario"));
}

#[test]
fn test_sample_scenario_runs() {
    Command::cargo_bin("stationsim")
        .unwrap()
        .arg(SCENARIO)
        .args(["--ticks", "400", "--log-level", "warn"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stations: 3"))
        .stdout(predicate::str::contains("Sunnyvale Colliery"))
        .stdout(predicate::str::contains("command failed: site unsuitable"));
}

#[test]
fn test_events_are_printed_as_json() {
    Command::cargo_bin("stationsim")
        .unwrap()
        .arg(SCENARIO)
        .args(["--ticks", "1", "--events", "--log-level", "error"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""type":"station_created""#));
}

#[test]
fn test_save_writes_world() {
    let dir = std::env::temp_dir().join(format!("stationsim-save-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let out = dir.join("world.json");

    Command::cargo_bin("stationsim")
        .unwrap()
        .arg(SCENARIO)
        .args(["--ticks", "75", "--log-level", "error", "--save"])
        .arg(&out)
        .assert()
        .success();

    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(saved["tick_counter"], 75);
    std::fs::remove_dir_all(&dir).ok();
}

//! Integration tests for the memvec CLI.
//!
//! Every test runs the real binary against a fresh temporary store with the
//! hash embedding provider, so no model download is needed.

mod common;

use predicates::prelude::*;
use tempfile::TempDir;

use common::isolated_cmd;

fn store(dir: &std::path::Path, id: &str, content: &str, extra: &[&str]) {
    isolated_cmd(dir)
        .args(["store", content, "--id", id])
        .args(extra)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Stored memory {}", id)));
}

fn json_stdout(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_store_then_get() {
    let temp = TempDir::new().expect("create temp dir");
    store(
        temp.path(),
        "pizza",
        "The user likes pizza",
        &["--type", "preference", "--tag", "food"],
    );

    isolated_cmd(temp.path())
        .args(["get", "pizza"])
        .assert()
        .success()
        .stdout(predicate::str::contains("The user likes pizza"))
        .stdout(predicate::str::contains("preference"))
        .stdout(predicate::str::contains("food"));

    assert!(temp.path().join("store").join("records.jsonl").exists());
}

#[test]
fn test_search_finds_stored_memory() {
    let temp = TempDir::new().expect("create temp dir");
    store(temp.path(), "pizza", "The user likes pizza with olives", &[]);
    store(temp.path(), "weather", "Sunny weather expected tomorrow", &[]);

    let output = isolated_cmd(temp.path())
        .args(["search", "pizza olives", "--min-score", "0.1", "--json"])
        .output()
        .expect("run search");
    assert!(output.status.success());

    let hits = json_stdout(&output);
    let hits = hits.as_array().expect("array of hits");
    assert!(!hits.is_empty());
    assert_eq!(hits[0]["id"], "pizza");
    assert!(hits.iter().all(|h| h["score"].as_f64().unwrap() >= 0.1));
    assert!(hits[0].get("vector").is_none());
}

#[test]
fn test_list_and_stats() {
    let temp = TempDir::new().expect("create temp dir");
    store(temp.path(), "a", "first memory about gardening", &[]);
    store(temp.path(), "b", "second memory about cooking", &[]);

    isolated_cmd(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("gardening"))
        .stdout(predicate::str::contains("cooking"));

    let output = isolated_cmd(temp.path())
        .args(["stats", "--json"])
        .output()
        .expect("run stats");
    assert!(output.status.success());
    let stats = json_stdout(&output);
    assert_eq!(stats["records"], 2);
    assert_eq!(stats["indexLive"], 2);
    assert_eq!(stats["backend"], "jsonl");
    assert_eq!(stats["embedding"]["provider"], "hash");
}

#[test]
fn test_export_clear_import_round_trip() {
    let temp = TempDir::new().expect("create temp dir");
    let backup = temp.path().join("backup.json");
    store(temp.path(), "a", "remember the milk", &["--tag", "errand"]);
    store(temp.path(), "b", "dentist appointment on monday", &[]);

    isolated_cmd(temp.path())
        .args(["export", "--output"])
        .arg(&backup)
        .assert()
        .success();
    assert!(backup.exists());

    isolated_cmd(temp.path())
        .args(["clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 2 memories"));

    isolated_cmd(temp.path())
        .args(["get", "a"])
        .assert()
        .failure();

    isolated_cmd(temp.path())
        .arg("import")
        .arg(&backup)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 memories"));

    isolated_cmd(temp.path())
        .args(["get", "a"])
        .assert()
        .success()
        .stdout(predicate::str::contains("remember the milk"))
        .stdout(predicate::str::contains("errand"));
}

#[test]
fn test_queued_store_is_synced() {
    let temp = TempDir::new().expect("create temp dir");

    isolated_cmd(temp.path())
        .args(["store", "call the plumber", "--id", "q1", "--queue", "--priority", "high"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Synced memory q1"));

    isolated_cmd(temp.path())
        .args(["get", "q1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("call the plumber"));
}

#[test]
fn test_delete_and_missing_ids_fail() {
    let temp = TempDir::new().expect("create temp dir");
    store(temp.path(), "gone", "short lived memory", &[]);

    isolated_cmd(temp.path())
        .args(["delete", "gone"])
        .assert()
        .success();

    isolated_cmd(temp.path())
        .args(["delete", "gone"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No memory with id 'gone'"));

    isolated_cmd(temp.path())
        .args(["get", "never-stored"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_clear_requires_confirmation() {
    let temp = TempDir::new().expect("create temp dir");
    store(temp.path(), "keep", "do not delete me", &[]);

    isolated_cmd(temp.path())
        .arg("clear")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));

    isolated_cmd(temp.path())
        .args(["get", "keep"])
        .assert()
        .success();
}

#[test]
fn test_evict_least_recently_used() {
    let temp = TempDir::new().expect("create temp dir");
    store(temp.path(), "old", "oldest memory", &[]);
    store(temp.path(), "new", "newest memory", &[]);

    let output = isolated_cmd(temp.path())
        .args(["evict", "1", "--json"])
        .output()
        .expect("run evict");
    assert!(output.status.success());
    assert_eq!(json_stdout(&output)["evicted"][0], "old");

    isolated_cmd(temp.path())
        .args(["get", "new"])
        .assert()
        .success();
}

#[test]
fn test_verify_reports_healthy_index() {
    let temp = TempDir::new().expect("create temp dir");
    store(temp.path(), "a", "alpha memory", &[]);

    isolated_cmd(temp.path())
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("Index healthy"));
}

#[test]
fn test_config_prints_effective_values() {
    let temp = TempDir::new().expect("create temp dir");
    std::fs::write(
        temp.path().join("config.yaml"),
        "search:\n  maxResults: 7\nsync:\n  debounceMs: 250\n",
    )
    .expect("write config");

    let output = isolated_cmd(temp.path())
        .args(["config", "--json"])
        .output()
        .expect("run config");
    assert!(output.status.success());
    let value = json_stdout(&output);
    assert_eq!(value["config"]["search"]["maxResults"], 7);
    assert_eq!(value["config"]["sync"]["debounceMs"], 250);
    assert_eq!(value["config"]["embedding"]["provider"], "hash");
}

#[test]
fn test_invalid_config_fails() {
    let temp = TempDir::new().expect("create temp dir");
    std::fs::write(temp.path().join("config.yaml"), "store:\n  dimension: 0\n")
        .expect("write config");

    isolated_cmd(temp.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_similarity_identical_texts() {
    let temp = TempDir::new().expect("create temp dir");
    let output = isolated_cmd(temp.path())
        .args(["similarity", "dark mode", "dark mode", "--json"])
        .output()
        .expect("run similarity");
    assert!(output.status.success());
    let score = json_stdout(&output)["similarity"].as_f64().unwrap();
    assert!(score > 0.99);
}

#[test]
fn test_small_bench_run() {
    let temp = TempDir::new().expect("create temp dir");
    let output = isolated_cmd(temp.path())
        .args(["bench", "--count", "300", "--queries", "10", "--dim", "16", "--json"])
        .output()
        .expect("run bench");
    assert!(output.status.success());
    let report = json_stdout(&output);
    assert_eq!(report["count"], 300);
    assert!(report["recall"].as_f64().unwrap() > 0.8);
}

//! End-to-end tests against the built `flowcard` binary.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn flowcard() -> Command {
    Command::cargo_bin("flowcard").expect("Failed to find flowcard binary")
}

fn sample_repo() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/lib.rs"),
        "pub fn checkout(cart: &Cart) -> Receipt {\n    charge(cart)\n}\n\nfn charge(cart: &Cart) -> Receipt {\n    Receipt::new()\n}\n",
    )
    .unwrap();
    fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"sample\"\nversion = \"0.1.0\"\n").unwrap();
    dir
}

#[test]
fn init_creates_local_config() {
    let dir = sample_repo();

    flowcard().arg("init").arg(dir.path()).arg("--no-index").assert().success();

    assert!(dir.path().join(".flowcard").join("config.toml").exists());
}

#[test]
fn init_then_index_generates_cards() {
    let dir = sample_repo();

    flowcard().arg("init").arg(dir.path()).assert().success();

    flowcard().current_dir(dir.path()).arg("health").arg("--json").assert().success().stdout(predicate::str::contains("\"status\": \"ok\""));
}

#[test]
fn health_on_fresh_workspace_reports_zero_cards() {
    let dir = sample_repo();
    flowcard().arg("init").arg(dir.path()).arg("--no-index").assert().success();

    flowcard()
        .current_dir(dir.path())
        .arg("health")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"cards\": 0"));
}

#[test]
fn search_before_init_fails() {
    let dir = tempfile::tempdir().unwrap();

    flowcard().current_dir(dir.path()).args(["search", "checkout flow"]).assert().failure();
}

#[test]
fn config_path_reports_local_config() {
    let dir = sample_repo();
    flowcard().arg("init").arg(dir.path()).arg("--no-index").assert().success();

    flowcard()
        .current_dir(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".flowcard"));
}

#[test]
fn config_put_rejects_unrecognised_key() {
    let dir = sample_repo();
    flowcard().arg("init").arg(dir.path()).arg("--no-index").assert().success();

    flowcard()
        .current_dir(dir.path())
        .args(["config", "put", "backend.qdrant.url", "http://localhost:6334"])
        .assert()
        .failure();
}

#[test]
fn config_put_and_get_round_trip() {
    let dir = sample_repo();
    flowcard().arg("init").arg(dir.path()).arg("--no-index").assert().success();

    flowcard().current_dir(dir.path()).args(["config", "put", "max_hub_cards", "5"]).assert().success();

    flowcard()
        .current_dir(dir.path())
        .args(["config", "get", "max_hub_cards"])
        .assert()
        .success()
        .stdout(predicate::str::contains("5"));
}

#[test]
fn repos_register_adds_to_list() {
    let dir = sample_repo();
    let other = tempfile::tempdir().unwrap();
    flowcard().arg("init").arg(dir.path()).arg("--no-index").assert().success();

    flowcard()
        .current_dir(dir.path())
        .args(["repos", "register", "billing", &other.path().to_string_lossy()])
        .assert()
        .success();

    flowcard()
        .current_dir(dir.path())
        .args(["repos", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("billing"));
}

#[test]
fn repos_unregister_removes_entry() {
    let dir = sample_repo();
    let other = tempfile::tempdir().unwrap();
    flowcard().arg("init").arg(dir.path()).arg("--no-index").assert().success();
    flowcard()
        .current_dir(dir.path())
        .args(["repos", "register", "billing", &other.path().to_string_lossy()])
        .assert()
        .success();

    flowcard().current_dir(dir.path()).args(["repos", "unregister", "billing"]).assert().success();

    flowcard()
        .current_dir(dir.path())
        .args(["repos", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("billing").not());
}

#[test]
fn sync_with_missing_changes_file_fails() {
    let dir = sample_repo();
    flowcard().arg("init").arg(dir.path()).assert().success();

    let root_name = dir.path().file_name().unwrap().to_string_lossy().to_string();
    flowcard()
        .current_dir(dir.path())
        .args(["sync", &root_name, "--changes-file", "nonexistent.json"])
        .assert()
        .failure();
}

#[test]
fn sync_stales_cards_touching_a_changed_file() {
    let dir = sample_repo();
    flowcard().arg("init").arg(dir.path()).assert().success();

    let changes = dir.path().join("changes.json");
    fs::write(&changes, r#"[{"path": "src/lib.rs", "status": "modified"}]"#).unwrap();

    let root_name = dir.path().file_name().unwrap().to_string_lossy().to_string();
    flowcard()
        .current_dir(dir.path())
        .args(["sync", &root_name, "--changes-file", changes.to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn reindex_status_reports_stale_count() {
    let dir = sample_repo();
    flowcard().arg("init").arg(dir.path()).assert().success();

    flowcard()
        .current_dir(dir.path())
        .args(["reindex", "status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("staleCount"));
}

#[test]
fn help_lists_every_command() {
    flowcard()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("repos"))
        .stdout(predicate::str::contains("reindex"))
        .stdout(predicate::str::contains("health"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("mcp"));
}

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn source_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "jobs/etl.py",
        "def load_orders(spark, path):\n    return spark.read.parquet(path)\n\n\ndef sla_breached(hours):\n    \"\"\"BUSINESS_RULE: breach after 48 hours\"\"\"\n    return hours > 48\n",
    );
    write(
        dir.path(),
        "sql/orders.sql",
        "-- name: get_active_orders\nSELECT order_id FROM orders WHERE total_amount > 10000;\n",
    );
    dir
}

fn rulescope(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rulescope").unwrap();
    cmd.arg("--path")
        .arg(root)
        .env_remove("RULESCOPE_LLM_ENDPOINT")
        .env_remove("RULESCOPE_LLM_MODEL")
        .env_remove("RULESCOPE_LLM_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_extract_json() {
    let dir = source_tree();
    let output = rulescope(dir.path())
        .args(["--format", "json", "extract", "--no-assistant"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let functions = json["functions"].as_array().unwrap();
    assert_eq!(functions.len(), 2);

    let sla = functions
        .iter()
        .find(|f| f["name"] == "sla_breached")
        .unwrap();
    assert_eq!(sla["classification"]["classification"], "business_logic");
    assert_eq!(sla["classification"]["confidence"], "high");

    let sql = json["sql_blocks"].as_array().unwrap();
    assert_eq!(sql[0]["name"], "get_active_orders");
    assert_eq!(sql[0]["sql_type"], "query");

    // extract never writes a snapshot
    assert!(!dir.path().join(".rulescope/snapshots/latest.json").exists());
}

#[test]
fn test_run_twice_then_history() {
    let dir = source_tree();

    rulescope(dir.path())
        .args(["run", "--no-assistant"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 added"))
        .stdout(predicate::str::contains("Snapshot saved"));

    rulescope(dir.path())
        .args(["run", "--no-assistant"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes since the last run."));

    rulescope(dir.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("snapshot_"));
}

#[test]
fn test_diff_does_not_save() {
    let dir = source_tree();

    rulescope(dir.path())
        .args(["--format", "json", "diff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"added\""));

    assert!(!dir.path().join(".rulescope/snapshots/latest.json").exists());
}

#[test]
fn test_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();

    rulescope(dir.path()).arg("init").assert().success();
    assert!(dir.path().join(".rulescope/config.toml").exists());

    rulescope(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));

    rulescope(dir.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn test_missing_root_fails() {
    Command::cargo_bin("rulescope")
        .unwrap()
        .args(["--path", "/definitely/not/here", "extract"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a directory"));
}

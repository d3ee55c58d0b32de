use assert_cmd::prelude::*;

use predicates::prelude::*;
use predicates::str::contains;
use std::process::Command;

/// `finsight` run from inside `dir` so no stray config file is picked up
fn finsight_cmd(dir: &tempfile::TempDir) -> Command {
  let mut cmd = Command::cargo_bin("finsight").expect("binary exists");
  cmd.current_dir(dir.path()).env_remove("FINSIGHT_SERVER").env_remove("FINSIGHT_CONFIG");
  cmd
}

#[test]
fn test_help_lists_subcommands() {
  let dir = tempfile::TempDir::new().unwrap();

  finsight_cmd(&dir)
    .arg("--help")
    .assert()
    .success()
    .stdout(contains("generate").and(contains("search")).and(contains("rebuild")).and(contains("health")));

  finsight_cmd(&dir)
    .args(["search", "--help"])
    .assert()
    .success()
    .stdout(contains("--user").and(contains("--top-k")).and(contains("--min-score")));
}

#[test]
fn test_generate_writes_data_once() {
  let dir = tempfile::TempDir::new().unwrap();
  let out = dir.path().join("transactions.json");

  finsight_cmd(&dir)
    .args(["generate", "--seed", "7", "--users", "2", "--out"])
    .arg(&out)
    .assert()
    .success()
    .stdout(contains("Generated"));

  let content = std::fs::read_to_string(&out).unwrap();
  let transactions: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
  assert!(!transactions.is_empty());
  assert!(transactions.iter().all(|t| t["userId"] == "user_1" || t["userId"] == "user_2"));

  finsight_cmd(&dir)
    .args(["generate", "--out"])
    .arg(&out)
    .assert()
    .failure()
    .stderr(contains("already exists"));
}

#[test]
fn test_search_requires_query() {
  let dir = tempfile::TempDir::new().unwrap();
  finsight_cmd(&dir).arg("search").assert().failure();
}

#[test]
fn test_unreachable_server_fails_cleanly() {
  let dir = tempfile::TempDir::new().unwrap();
  finsight_cmd(&dir)
    .args(["--server", "http://127.0.0.1:1", "health"])
    .assert()
    .failure();
}

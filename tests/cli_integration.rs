//! CLI Integration Tests
//!
//! These tests verify that the CLI commands work correctly end-to-end.
//! They test the actual binary behavior, not just the library.
//!
//! Run with:
//! ```bash
//! cargo test --test cli_integration
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Path to the built binary
fn csmtctl_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_csmtctl"))
}

/// Run csmtctl and return (stdout, stderr, success)
fn run_csmtctl(args: &[&str], db_path: &Path) -> (String, String, bool) {
    let config = db_path.with_extension("config.json");
    if !config.exists() {
        std::fs::write(&config, r#"{"sync_on_commit": false}"#).unwrap();
    }

    let output = Command::new(csmtctl_binary())
        .arg("-d")
        .arg(db_path)
        .arg("-c")
        .arg(&config)
        .args(["-f", "json"])
        .args(args)
        .output()
        .expect("Failed to execute csmtctl");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout.trim()).expect("stdout should be JSON")
}

// ============================================================================
// Database Initialization Tests
// ============================================================================

#[test]
fn test_cli_init_creates_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("tree.csmt");

    let (stdout, _stderr, success) = run_csmtctl(&["init"], &db_path);

    assert!(success, "init should succeed");
    assert_eq!(json(&stdout)["status"], "ok");
    assert!(db_path.exists(), "database file should be created");
}

#[test]
fn test_cli_empty_root() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("tree.csmt");

    let (stdout, _, success) = run_csmtctl(&["root"], &db_path);
    assert!(success);
    assert_eq!(json(&stdout)["root"], csmt::empty_root().to_hex());
}

// ============================================================================
// Key/Value Tests
// ============================================================================

#[test]
fn test_cli_set_get_delete() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("tree.csmt");

    let (stdout, _, success) = run_csmtctl(&["set", "alice", "100"], &db_path);
    assert!(success, "set should succeed");
    let set_root = json(&stdout)["root"].clone();

    let (stdout, _, success) = run_csmtctl(&["get", "alice"], &db_path);
    assert!(success, "get should succeed");
    assert_eq!(
        json(&stdout)["value"],
        csmt::Hash::digest(b"100").to_hex(),
        "value should be hashed like the key"
    );

    let (stdout, _, _) = run_csmtctl(&["root"], &db_path);
    assert_eq!(json(&stdout)["root"], set_root, "root should persist");

    let (stdout, _, success) = run_csmtctl(&["delete", "alice"], &db_path);
    assert!(success, "delete should succeed");
    assert_eq!(json(&stdout)["root"], csmt::empty_root().to_hex());

    let (_, _, success) = run_csmtctl(&["get", "alice"], &db_path);
    assert!(!success, "get of a deleted key should fail");
}

#[test]
fn test_cli_hex_keys_used_verbatim() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("tree.csmt");
    let key = csmt::Hash::digest(b"raw key").to_hex();

    let (stdout, _, success) = run_csmtctl(&["set", &key, "v"], &db_path);
    assert!(success);
    assert_eq!(json(&stdout)["key"], key);
}

// ============================================================================
// Proof Tests
// ============================================================================

#[test]
fn test_cli_prove_and_verify() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("tree.csmt");
    let proof_path = dir.path().join("proof.json");

    for i in 0..10 {
        let (_, _, success) =
            run_csmtctl(&["set", &format!("key{}", i), &format!("val{}", i)], &db_path);
        assert!(success);
    }

    let (_, _, success) = run_csmtctl(
        &["prove", "key3", "--output", proof_path.to_str().unwrap()],
        &db_path,
    );
    assert!(success, "prove should succeed");
    assert!(proof_path.exists());

    let (stdout, _, success) =
        run_csmtctl(&["verify", proof_path.to_str().unwrap()], &db_path);
    assert!(success, "proof should verify against the database root");
    assert_eq!(json(&stdout)["valid"], true);

    let other_root = csmt::Hash::digest(b"other").to_hex();
    let (stdout, _, success) = run_csmtctl(
        &["verify", proof_path.to_str().unwrap(), "--root", &other_root],
        &db_path,
    );
    assert!(!success, "proof should not verify against another root");
    assert_eq!(json(&stdout)["valid"], false);
}

#[test]
fn test_cli_witness_then_apply() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("tree.csmt");
    let witness_path = dir.path().join("witness.json");

    run_csmtctl(&["set", "a", "1"], &db_path);
    let (stdout, _, _) = run_csmtctl(&["root"], &db_path);
    let old_root = json(&stdout)["root"].as_str().unwrap().to_string();

    let (stdout, _, success) = run_csmtctl(&["witness", "b", "2"], &db_path);
    assert!(success, "witness should succeed");
    std::fs::write(&witness_path, stdout.trim()).unwrap();

    let (stdout, _, _) = run_csmtctl(&["root"], &db_path);
    assert_eq!(json(&stdout)["root"], old_root, "witness should not write");

    let (stdout, _, success) = run_csmtctl(
        &["apply", witness_path.to_str().unwrap(), "--root", &old_root],
        &db_path,
    );
    assert!(success, "apply should succeed");
    let predicted = json(&stdout)["new_root"].clone();

    let (stdout, _, _) = run_csmtctl(&["set", "b", "2"], &db_path);
    assert_eq!(json(&stdout)["root"], predicted);
}

// ============================================================================
// Maintenance Tests
// ============================================================================

#[test]
fn test_cli_prune_and_compact() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("tree.csmt");

    for round in 0..3 {
        for i in 0..5 {
            run_csmtctl(
                &["set", &format!("key{}", i), &format!("val{}-{}", round, i)],
                &db_path,
            );
        }
    }
    let (stdout, _, _) = run_csmtctl(&["root"], &db_path);
    let root = json(&stdout)["root"].clone();

    let (stdout, _, success) = run_csmtctl(&["prune"], &db_path);
    assert!(success, "prune should succeed");
    assert!(json(&stdout)["removed"].as_u64().unwrap() > 0);

    let (stdout, _, success) = run_csmtctl(&["compact"], &db_path);
    assert!(success, "compact should succeed");
    let result = json(&stdout);
    assert!(result["bytes_after"].as_u64().unwrap() < result["bytes_before"].as_u64().unwrap());

    let (stdout, _, _) = run_csmtctl(&["root"], &db_path);
    assert_eq!(json(&stdout)["root"], root, "maintenance keeps the root");

    let (stdout, _, success) = run_csmtctl(&["stats"], &db_path);
    assert!(success);
    assert_eq!(json(&stdout)["leaves"], 5);
}

#[test]
fn test_cli_help() {
    let output = Command::new(csmtctl_binary())
        .arg("--help")
        .output()
        .expect("Failed to execute csmtctl");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("tree.csmt"), "help should show default path");
    assert!(stdout.contains("prove"));
}

//! Integration tests for the CLI interface

mod common;

use assert_cmd::Command;
use common::{color_layout, link_target, TestTarget};
use predicates::prelude::*;
use tempfile::TempDir;

fn tier_engine() -> Command {
    let mut cmd = Command::cargo_bin("tier-engine").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("VERBOSE")
        .env_remove("IAC_TIER_DIR")
        .env_remove("TIER_ENGINE_CONFIG")
        .env_remove("TIER_ENGINE_MAMBA")
        .env_remove("TIER_ENGINE_RESOURCES");
    cmd
}

fn deploy(target: &TestTarget) -> Command {
    let mut cmd = tier_engine();
    cmd.arg("--mamba")
        .arg(target.mamba())
        .arg("--resources")
        .arg(target.resources())
        .arg("deploy");
    cmd
}

#[test]
fn test_cli_help_lists_commands() {
    tier_engine()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("promote"))
        .stdout(predicate::str::contains("bootstrap"));
}

#[test]
fn test_deploy_help_shows_flags() {
    tier_engine()
        .args(["deploy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--keep"))
        .stdout(predicate::str::contains("--env-def"));
}

#[test]
fn test_deploy_requires_existing_target() {
    tier_engine()
        .args(["deploy", "/definitely/not/here", "blue"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("target is not a directory"));
}

#[test]
fn test_usage_errors_have_their_own_exit_code() {
    tier_engine()
        .args(["deploy", "/srv"])
        .assert()
        .code(11)
        .stderr(predicate::str::contains("<TIER>"));

    tier_engine()
        .args(["deploy", "--no-such-flag"])
        .assert()
        .code(11);
}

#[test]
fn test_bootstrap_requires_existing_home() {
    let temp = TempDir::new().unwrap();

    tier_engine()
        .arg("bootstrap")
        .arg(temp.path().join("missing"))
        .args(["--conda", "/opt/conda/bin/conda", "--engine-def", "engine.yaml"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("engine home is not a directory"));
}

#[test]
fn test_deploy_with_fake_mamba() {
    let target = TestTarget::new().unwrap();

    deploy(&target)
        .arg(target.target())
        .args(["blue", "--force"])
        .assert()
        .success();

    let tier = target.infrastructure().join("blue");
    assert!(tier.join("conda/envs/conda/conda-meta").is_dir());
    assert!(tier.join("conda/envs/unix/conda-meta").is_dir());
    assert!(tier.join("bin/tier-activate").is_file());
    assert!(tier.join("etc/condarc").is_file());
    for name in ["commit", "tree_hash", "description"] {
        let contents = std::fs::read_to_string(tier.join("meta").join(name)).unwrap();
        assert!(!contents.is_empty());
    }
}

#[test]
fn test_dry_run_echoes_commands() {
    let target = TestTarget::new().unwrap();

    deploy(&target)
        .arg(target.target())
        .args(["dev", "-n", "--force"])
        .assert()
        .success();

    let tier = target.infrastructure().join("dev");
    assert!(tier.is_dir());
    assert!(!tier.join("conda/envs/conda").exists());
    assert!(!tier.join("meta").exists());

    let logs: Vec<_> = std::fs::read_dir(tier.join("logs"))
        .unwrap()
        .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
        .collect();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|log| log.contains("env create")));
}

#[test]
fn test_bad_tier_name_exit_code() {
    let target = TestTarget::new().unwrap();

    deploy(&target)
        .arg(target.target())
        .arg("qa")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("invalid tier name"));
}

#[test]
fn test_production_target_exit_code() {
    let target = TestTarget::new().unwrap();

    deploy(&target)
        .arg(target.target())
        .args(["production", "--force"])
        .assert()
        .code(4);
}

#[test]
fn test_missing_mamba_exit_code() {
    let target = TestTarget::new().unwrap();

    tier_engine()
        .arg("--mamba")
        .arg(target.root().join("nowhere/mamba"))
        .arg("--resources")
        .arg(target.resources())
        .arg("deploy")
        .arg(target.target())
        .args(["blue", "--force"])
        .assert()
        .code(2);
}

#[test]
fn test_promote_without_tier_dir_fails() {
    tier_engine()
        .arg("promote")
        .assert()
        .code(9)
        .stderr(predicate::str::contains("IAC_TIER_DIR"));
}

#[test]
fn test_promote_swaps_links() {
    let temp = TempDir::new().unwrap();
    let infrastructure = temp.path().join("infrastructure");
    color_layout(&infrastructure, "blue", Some("green")).unwrap();

    tier_engine()
        .arg("promote")
        .env("IAC_TIER_DIR", infrastructure.join("blue"))
        .assert()
        .success();

    assert_eq!(link_target(&infrastructure.join("staging")), "green");
    assert_eq!(link_target(&infrastructure.join("production")), "blue");
}

#[test]
fn test_promote_same_color_exit_code() {
    let temp = TempDir::new().unwrap();
    let infrastructure = temp.path().join("infrastructure");
    color_layout(&infrastructure, "blue", Some("blue")).unwrap();

    tier_engine()
        .arg("promote")
        .env("IAC_TIER_DIR", infrastructure.join("blue"))
        .assert()
        .code(8)
        .stderr(predicate::str::contains("same color"));
}

#[test]
fn test_invalid_config_exit_code() {
    let target = TestTarget::new().unwrap();
    let config = target.root().join("engine.yaml");
    std::fs::write(&config, "disk_space: [not, a, mapping]\n").unwrap();

    deploy(&target)
        .arg("--config")
        .arg(&config)
        .arg(target.target())
        .arg("blue")
        .assert()
        .code(10);
}

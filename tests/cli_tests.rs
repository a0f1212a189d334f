//! CLI surface tests.
//!
//! These exercise the binary end to end with an isolated HOME so the real
//! user's config and cache never leak in. Network-touching paths are pinned
//! to deterministic failures (manual backend + no credentials).

use assert_cmd::Command;
use predicates::prelude::*;

fn ingot(home: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ingot").expect("binary builds");
    cmd.env("HOME", home.path());
    cmd.env_remove("INGOT_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    let home = tempfile::tempdir().unwrap();
    ingot(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ticket-driven"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("cache"));
}

#[test]
fn version_prints() {
    let home = tempfile::tempdir().unwrap();
    ingot(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingot"));
}

#[test]
fn cache_stats_on_fresh_home_is_empty() {
    let home = tempfile::tempdir().unwrap();
    ingot(&home)
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache is empty."));
}

#[test]
fn cache_clear_succeeds() {
    let home = tempfile::tempdir().unwrap();
    ingot(&home)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache cleared"));
}

#[test]
fn cache_clear_rejects_unknown_platform() {
    let home = tempfile::tempdir().unwrap();
    ingot(&home)
        .args(["cache", "clear", "--platform", "gitlab"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown platform"));
}

#[test]
fn ticket_with_unrecognized_input_exits_platform_not_configured() {
    let home = tempfile::tempdir().unwrap();
    ingot(&home)
        .env("AI_BACKEND", "manual")
        .args(["ticket", "???definitely-not-a-ticket???"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn ticket_without_credentials_exits_platform_not_configured() {
    let home = tempfile::tempdir().unwrap();
    // Manual backend, no FALLBACK_* credentials: no fetcher can serve Jira.
    ingot(&home)
        .env("AI_BACKEND", "manual")
        .args(["ticket", "PROJ-123", "--platform", "jira"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn invalid_backend_value_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    ingot(&home)
        .env("AI_BACKEND", "skynet")
        .args(["ticket", "PROJ-123", "--platform", "jira"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("AI_BACKEND"));
}

//! # Git Shell-Outs
//!
//! Thin wrappers over the `git` CLI for the workflow runner: dirty-state
//! handling, branch management, checkpoint commits, and the diffs that feed
//! task memory capture. Every function degrades gracefully outside a git
//! repository.

use std::process::Command;

use tracing::debug;

/// Outcome of asking the user what to do with a dirty worktree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyStateAction {
    Stash,
    Commit,
    Abort,
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        debug!(?args, "git command failed");
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Whether the worktree has uncommitted changes.
pub fn is_dirty() -> bool {
    git(&["status", "--porcelain"]).map(|out| !out.is_empty()).unwrap_or(false)
}

pub fn current_branch() -> String {
    git(&["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_default()
}

pub fn current_commit() -> String {
    git(&["rev-parse", "HEAD"]).unwrap_or_default()
}

pub fn short_commit() -> String {
    git(&["rev-parse", "--short", "HEAD"]).unwrap_or_default()
}

/// Create and switch to a branch. False when git refuses (exists, invalid
/// name, not a repository).
pub fn create_branch(name: &str) -> bool {
    Command::new("git")
        .args(["checkout", "-b", name])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn stash_changes(message: &str) -> bool {
    Command::new("git")
        .args(["stash", "push", "-u", "-m", message])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Stage everything and commit. Returns the short hash on success.
pub fn commit_all(message: &str) -> Option<String> {
    Command::new("git").args(["add", "-A"]).output().ok()?;
    let committed = Command::new("git")
        .args(["commit", "-m", message])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if committed {
        Some(short_commit())
    } else {
        None
    }
}

/// Resolve a dirty worktree per the chosen action. True when the workflow
/// may proceed.
pub fn handle_dirty_state(context: &str, action: DirtyStateAction) -> bool {
    match action {
        DirtyStateAction::Stash => stash_changes(&format!("ingot: before {context}")),
        DirtyStateAction::Commit => commit_all(&format!("WIP before {context}")).is_some(),
        DirtyStateAction::Abort => false,
    }
}

/// Paths changed in the worktree (staged and unstaged) relative to HEAD.
pub fn modified_files() -> Vec<String> {
    git(&["diff", "--name-only", "HEAD"])
        .map(|out| out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
        .unwrap_or_default()
}

/// Full worktree diff text relative to HEAD.
pub fn worktree_diff() -> String {
    git(&["diff", "HEAD"]).unwrap_or_default()
}

//! CLI tests for `shiki worktree`.
//!
//! Each test builds a throwaway repository and checks exit codes plus the
//! repository state left behind.

use std::path::Path;
use std::process::{Command, Output};

use shiki::exit_codes;
use shiki::io::git::Git;
use shiki::test_support::TestRepo;

fn shiki(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shiki"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("spawn shiki")
}

#[test]
fn conflicts_exit_code_tracks_overlap() {
    let repo = TestRepo::new().expect("repo");
    repo.commit_on_branch("a", "src/shared.rs", "a\n").expect("commit");
    repo.commit_on_branch("b", "src/shared.rs", "b\n").expect("commit");
    repo.commit_on_branch("c", "docs/notes.md", "c\n").expect("commit");

    let disjoint = shiki(repo.path(), &["worktree", "conflicts", "--branches", "a", "c"]);
    assert_eq!(disjoint.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&disjoint.stdout).contains("no overlapping files"));

    let overlapping = shiki(repo.path(), &["worktree", "conflicts", "--branches", "a", "b"]);
    assert_eq!(overlapping.status.code(), Some(exit_codes::FAILURE));
    assert!(String::from_utf8_lossy(&overlapping.stdout).contains("src/shared.rs"));
}

#[test]
fn create_twice_is_a_no_op() {
    let repo = TestRepo::new().expect("repo");

    let first = shiki(
        repo.path(),
        &["worktree", "create", "--branch", "shiki/task-T-1", "--task-id", "T-1"],
    );
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    let second = shiki(
        repo.path(),
        &["worktree", "create", "--branch", "shiki/task-T-1", "--task-id", "T-1"],
    );
    assert_eq!(second.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&second.stderr).contains("already exists"));

    let worktrees = Git::new(repo.path()).worktree_list().expect("list");
    assert_eq!(worktrees.len(), 2);

    let list = shiki(repo.path(), &["worktree", "list"]);
    assert!(String::from_utf8_lossy(&list.stdout).contains("shiki/task-T-1\tT-1"));

    let cleanup = shiki(repo.path(), &["worktree", "cleanup", "--branch", "shiki/task-T-1"]);
    assert_eq!(cleanup.status.code(), Some(exit_codes::OK));
    assert_eq!(Git::new(repo.path()).worktree_list().expect("list").len(), 1);
}

#[test]
fn conflicting_merge_restores_original_branch() {
    let repo = TestRepo::new().expect("repo");
    repo.commit_on_branch("feature", "README.md", "feature\n").expect("commit");
    repo.commit_on_branch("main", "README.md", "main\n").expect("commit");
    repo.git(&["checkout", "-b", "side"]).expect("checkout");

    let output = shiki(repo.path(), &["worktree", "merge", "--branch", "feature"]);

    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(String::from_utf8_lossy(&output.stderr).contains("conflicts"));
    assert_eq!(repo.current_branch().expect("branch"), "side");
    assert!(!Git::new(repo.path()).merge_in_progress().expect("merge state"));
}

#[test]
fn merge_with_missing_ref_fails() {
    let repo = TestRepo::new().expect("repo");
    let output = shiki(repo.path(), &["worktree", "merge", "--branch", "nope"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ref not found: nope"));
}

#[test]
fn conflicts_with_one_real_branch_fails() {
    let repo = TestRepo::new().expect("repo");
    repo.commit_on_branch("a", "src/lib.rs", "a\n").expect("commit");

    let output = shiki(repo.path(), &["worktree", "conflicts", "--branches", "a", "missing"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(String::from_utf8_lossy(&output.stderr).contains("at least 2 existing branches"));
}

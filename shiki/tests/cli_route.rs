//! CLI tests for `shiki route`.
//!
//! Spawns the shiki binary in a scaffolded project with codex availability
//! pinned in config, so no probe runs.

use std::fs;
use std::process::Command;

use shiki::exit_codes;
use shiki::io::init::{InitOptions, init_project};
use shiki::io::paths::ShikiPaths;
use shiki::io::task_store::read_task;
use shiki::task::{Assignee, TaskStatus};

fn project(codex_available: bool) -> (tempfile::TempDir, ShikiPaths) {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");
    fs::write(
        &paths.config_path,
        format!("[routing]\ncodex_available = {codex_available}\n"),
    )
    .expect("write config");
    (temp, paths)
}

#[test]
fn route_prints_engine_and_writes_back_pending_task() {
    let (temp, paths) = project(true);
    let task_path = paths.task_path("T-1");
    fs::write(
        &task_path,
        r#"{"id":"T-1","title":"Add unit tests for parser","status":"pending","context":{"target_files":["src/parser.rs"]},"acceptance":["covers errors","covers happy path"]}"#,
    )
    .expect("write task");

    let output = Command::new(env!("CARGO_BIN_EXE_shiki"))
        .current_dir(temp.path())
        .args(["route", ".shiki/tasks/T-1.json"])
        .output()
        .expect("shiki route");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "codex");
    assert!(String::from_utf8_lossy(&output.stderr).contains("reason=affinity(claude=0,codex="));

    let task = read_task(&task_path).expect("read task");
    assert_eq!(task.assigned_to, Some(Assignee::Codex));
    assert_eq!(task.status, Some(TaskStatus::Pending));
}

#[test]
fn unavailable_codex_routes_to_claude_team() {
    let (temp, paths) = project(false);
    fs::write(
        paths.task_path("T-2"),
        r#"{"id":"T-2","title":"Add unit tests","status":"pending"}"#,
    )
    .expect("write task");

    let output = Command::new(env!("CARGO_BIN_EXE_shiki"))
        .current_dir(temp.path())
        .args(["route", ".shiki/tasks/T-2.json", "--dry-run"])
        .output()
        .expect("shiki route");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "claude-team");
    assert!(String::from_utf8_lossy(&output.stderr).contains("engine_unavailable"));
}

#[test]
fn route_all_reports_bad_files_and_keeps_going() {
    let (temp, paths) = project(true);
    fs::write(
        paths.task_path("T-1"),
        r#"{"id":"T-1","title":"review architecture plan","status":"pending"}"#,
    )
    .expect("write task");
    fs::write(paths.task_path("T-2"), "not json").expect("write task");

    let output = Command::new(env!("CARGO_BIN_EXE_shiki"))
        .current_dir(temp.path())
        .args(["route", "--all", "--dry-run"])
        .output()
        .expect("shiki route --all");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("T-1"));
    assert!(stdout.contains("claude-team"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("T-2.json"));
    assert!(stderr.contains("dry run"));
}

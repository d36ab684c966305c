//! Session snapshots under `.shiki/state/session-<id>.json`.
//!
//! Snapshots are append-only: one file per session, created once and never
//! rewritten.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::io::files::{json_files, read_json};
use crate::io::git::Git;
use crate::io::paths::ShikiPaths;
use crate::io::task_store::{ProjectStore, TaskStore};
use crate::task::Task;

const SESSION_PREFIX: &str = "session-";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta_phase: Option<String>,
    #[serde(default)]
    pub active_tasks: Vec<TaskSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_state: Option<GitState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitState {
    pub branch: String,
    pub commit_sha: String,
    #[serde(default)]
    pub dirty_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
}

impl TaskSummary {
    fn from_task(task: &Task) -> Option<Self> {
        let status = task.status?;
        status.is_active().then(|| Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: status.as_str().to_string(),
            assigned_to: task.assigned_to.map(|who| who.as_str().to_string()),
            claimed_by: task.claimed_by.clone(),
        })
    }
}

/// Inputs for [`capture`] that do not come from disk.
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub mode: String,
    pub team_name: Option<String>,
    pub theta_phase: Option<String>,
    pub notes: Option<String>,
}

pub fn session_id(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Build a snapshot from the project store and the repository state.
///
/// Outside a git repository the snapshot simply has no `git_state`.
#[instrument(skip_all)]
pub fn capture(paths: &ShikiPaths, options: &CaptureOptions, now: DateTime<Utc>) -> Result<SessionSnapshot> {
    let snapshot = ProjectStore::new(&paths.tasks_dir).load()?;
    let active_tasks = snapshot
        .tasks
        .values()
        .filter_map(TaskSummary::from_task)
        .collect();

    let git_state = match git_state(&Git::new(&paths.root)) {
        Ok(state) => Some(state),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "git state unavailable");
            None
        }
    };

    Ok(SessionSnapshot {
        session_id: session_id(now),
        mode: options.mode.clone(),
        timestamp: now.to_rfc3339(),
        team_name: options.team_name.clone(),
        theta_phase: options.theta_phase.clone(),
        active_tasks,
        git_state,
        notes: options.notes.clone(),
        extra: Map::new(),
    })
}

fn git_state(git: &Git) -> Result<GitState> {
    let commit_sha = git.head_sha()?;
    let branch = git.current_branch().unwrap_or_else(|_| "HEAD".to_string());
    let dirty_files = git
        .status_porcelain()?
        .into_iter()
        .map(|entry| entry.path)
        .collect();
    Ok(GitState {
        branch,
        commit_sha,
        dirty_files,
    })
}

/// Create `session-<id>.json`; refuses to overwrite an existing snapshot.
#[instrument(skip_all, fields(session_id = %snapshot.session_id))]
pub fn write_snapshot(state_dir: &Path, snapshot: &SessionSnapshot) -> Result<PathBuf> {
    fs::create_dir_all(state_dir)
        .with_context(|| format!("create directory {}", state_dir.display()))?;
    let path = state_dir.join(format!("{SESSION_PREFIX}{}.json", snapshot.session_id));
    let mut buf = serde_json::to_string_pretty(snapshot).context("serialize session snapshot")?;
    buf.push('\n');

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("create session snapshot {}", path.display()))?;
    file.write_all(buf.as_bytes())
        .with_context(|| format!("write session snapshot {}", path.display()))?;
    debug!(path = %path.display(), "session snapshot written");
    Ok(path)
}

pub fn read_snapshot(path: &Path) -> Result<SessionSnapshot> {
    read_json(path)
}

/// Session snapshot files, newest modification time first.
pub fn snapshots_newest_first(state_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
    for path in json_files(state_dir)? {
        let is_session = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with(SESSION_PREFIX));
        if !is_session {
            continue;
        }
        let modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .with_context(|| format!("stat {}", path.display()))?;
        files.push((modified, path));
    }
    files.sort_by(|left, right| right.cmp(left));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

pub fn latest_snapshot(state_dir: &Path) -> Result<Option<PathBuf>> {
    Ok(snapshots_newest_first(state_dir)?.into_iter().next())
}

/// `team_name` from the newest snapshot that records one.
pub fn latest_team_name(state_dir: &Path) -> Result<Option<String>> {
    for path in snapshots_newest_first(state_dir)? {
        match read_snapshot(&path) {
            Ok(snapshot) => {
                if let Some(name) = snapshot.team_name.filter(|name| !name.trim().is_empty()) {
                    return Ok(Some(name));
                }
            }
            Err(err) => warn!(path = %path.display(), err = %format!("{err:#}"), "skipping session"),
        }
    }
    Ok(None)
}

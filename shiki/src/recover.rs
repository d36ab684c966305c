//! `shiki session save` and `shiki session recover`.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::info;

use crate::io::config::ShikiConfig;
use crate::io::paths::ShikiPaths;
use crate::io::recovery::{RecoveryInputs, render_recovery_brief};
use crate::io::session::{
    CaptureOptions, capture, latest_snapshot, read_snapshot, write_snapshot,
};
use crate::io::task_store::{ProjectStore, TaskStore};
use crate::sync::resolve_team_name;
use crate::task::Task;

#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub mode: String,
    pub team_name: Option<String>,
    pub phase: Option<String>,
    pub notes: Option<String>,
}

/// Capture and write a new session snapshot.
pub fn save_session(paths: &ShikiPaths, config: &ShikiConfig, options: &SaveOptions) -> Result<PathBuf> {
    let team_name = resolve_team_name(options.team_name.as_deref(), paths, config)?;
    let capture_options = CaptureOptions {
        mode: options.mode.clone(),
        team_name: Some(team_name),
        theta_phase: options.phase.clone(),
        notes: options.notes.clone(),
    };
    let snapshot = capture(paths, &capture_options, Utc::now())?;
    let path = write_snapshot(&paths.state_dir, &snapshot)?;
    info!(
        path = %path.display(),
        active_tasks = snapshot.active_tasks.len(),
        "session saved"
    );
    Ok(path)
}

/// Recovery brief from `file`, or from the newest snapshot when absent.
pub fn recover_session(paths: &ShikiPaths, config: &ShikiConfig, file: Option<&Path>) -> Result<String> {
    let snapshot_path = match file {
        Some(path) => path.to_path_buf(),
        None => latest_snapshot(&paths.state_dir)?.ok_or_else(|| {
            anyhow!(
                "no session snapshots in {} (run `shiki session save`)",
                paths.state_dir.display()
            )
        })?,
    };
    let snapshot = read_snapshot(&snapshot_path)?;
    info!(path = %snapshot_path.display(), "recovering session");

    let team_name = match snapshot.team_name.as_deref() {
        Some(name) => name.to_string(),
        None => resolve_team_name(None, paths, config)?,
    };
    let tasks: Vec<Task> = ProjectStore::new(&paths.tasks_dir)
        .load()?
        .tasks
        .into_values()
        .collect();
    render_recovery_brief(&RecoveryInputs {
        snapshot: &snapshot,
        tasks: &tasks,
        team_name: &team_name,
        session_limit: config.budget.limits().per_session,
    })
}

//! `shiki sync`: reconcile the native team store with the project store.
//!
//! The native store is the primary side, the project store the secondary.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::ValueEnum;
use tracing::{debug, info, instrument, warn};

use crate::core::reconcile::{
    ChangeKind, PropagateOptions, SyncReport, TaskChange, compare, propagate,
};
use crate::io::config::ShikiConfig;
use crate::io::paths::ShikiPaths;
use crate::io::session::latest_team_name;
use crate::io::task_store::{LoadError, ProjectStore, StoreSnapshot, TaskStore, TeamStore};

/// `mode_origin` stamped on records the reconciler creates.
pub const SYNC_ORIGIN: &str = "cli";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SyncDirection {
    /// native -> project, then project -> native.
    #[default]
    Both,
    /// native -> project.
    ToPrimary,
    /// project -> native.
    ToSecondary,
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub team_name: Option<String>,
    pub direction: SyncDirection,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub team_name: String,
    pub team_dir: PathBuf,
    /// Divergence before any propagation.
    pub report: SyncReport,
    pub to_project: Vec<TaskChange>,
    pub to_native: Vec<TaskChange>,
    pub errors: Vec<LoadError>,
    pub withheld: Vec<Withheld>,
}

/// A change left unapplied because the destination record exists on disk but
/// could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Withheld {
    pub store: &'static str,
    pub id: String,
}

/// Team name from the flag, the newest session, the config, or the project
/// directory, in that order.
pub fn resolve_team_name(
    explicit: Option<&str>,
    paths: &ShikiPaths,
    config: &ShikiConfig,
) -> Result<String> {
    if let Some(name) = explicit.map(str::trim).filter(|name| !name.is_empty()) {
        return Ok(name.to_string());
    }
    if let Some(name) = latest_team_name(&paths.state_dir)? {
        debug!(%name, "team name from session snapshot");
        return Ok(name);
    }
    if let Some(name) = config.name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
        debug!(%name, "team name from config");
        return Ok(name.to_string());
    }
    paths
        .root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("cannot derive a team name from {}", paths.root.display()))
}

#[instrument(skip_all, fields(direction = ?options.direction, dry_run = options.dry_run))]
pub fn sync(paths: &ShikiPaths, config: &ShikiConfig, options: &SyncOptions) -> Result<SyncOutcome> {
    let team_name = resolve_team_name(options.team_name.as_deref(), paths, config)?;
    let teams_dir = config.sync.resolved_teams_dir()?;
    let native = TeamStore::new(&teams_dir, &team_name)?;
    let project = ProjectStore::new(&paths.tasks_dir);

    let mut native_snapshot = native.load()?;
    let mut project_snapshot = project.load()?;
    let report = compare(&native_snapshot.tasks, &project_snapshot.tasks);
    info!(
        team = %team_name,
        discrepancies = report.discrepancies(),
        in_sync = report.in_sync.len(),
        "compared stores"
    );

    let propagate_options = PropagateOptions {
        now: Utc::now().to_rfc3339(),
        origin: SYNC_ORIGIN.to_string(),
    };
    let mut to_project = Vec::new();
    let mut to_native = Vec::new();
    let mut withheld = Vec::new();
    if matches!(options.direction, SyncDirection::Both | SyncDirection::ToPrimary) {
        to_project = propagate(
            &native_snapshot.tasks,
            &mut project_snapshot.tasks,
            &propagate_options,
        );
        withheld.extend(withhold_unreadable(&project, &mut project_snapshot, &mut to_project));
        if !options.dry_run {
            save_changes(&project, &project_snapshot, &to_project)?;
        }
    }
    if matches!(options.direction, SyncDirection::Both | SyncDirection::ToSecondary) {
        to_native = propagate(
            &project_snapshot.tasks,
            &mut native_snapshot.tasks,
            &propagate_options,
        );
        withheld.extend(withhold_unreadable(&native, &mut native_snapshot, &mut to_native));
        if !options.dry_run {
            save_changes(&native, &native_snapshot, &to_native)?;
        }
    }

    let mut errors = native_snapshot.errors;
    errors.extend(project_snapshot.errors);
    Ok(SyncOutcome {
        team_name,
        team_dir: native.team_dir().to_path_buf(),
        report,
        to_project,
        to_native,
        errors,
        withheld,
    })
}

/// Drop changes aimed at records that failed to load. A created record is
/// also removed from the snapshot so later steps never see it.
fn withhold_unreadable(
    store: &dyn TaskStore,
    snapshot: &mut StoreSnapshot,
    changes: &mut Vec<TaskChange>,
) -> Vec<Withheld> {
    let mut withheld = Vec::new();
    changes.retain(|change| {
        if !snapshot.unreadable.contains(&change.id) {
            return true;
        }
        warn!(store = store.label(), id = %change.id, "not touching unreadable task record");
        if change.kind == ChangeKind::Created {
            snapshot.tasks.remove(&change.id);
        }
        withheld.push(Withheld {
            store: store.label(),
            id: change.id.clone(),
        });
        false
    });
    withheld
}

fn save_changes(store: &dyn TaskStore, snapshot: &StoreSnapshot, changes: &[TaskChange]) -> Result<()> {
    for change in changes {
        let task = snapshot
            .tasks
            .get(&change.id)
            .with_context(|| format!("changed task {} missing from {} store", change.id, store.label()))?;
        let path = store.save(task, snapshot.sources.get(&change.id).map(PathBuf::as_path))?;
        debug!(store = store.label(), id = %change.id, path = %path.display(), "saved");
    }
    Ok(())
}

/// Human-readable report for stdout.
pub fn format_outcome(outcome: &SyncOutcome, dry_run: bool, verbose: bool) -> String {
    let report = &outcome.report;
    let mut out = String::new();
    let _ = writeln!(out, "team: {} ({})", outcome.team_name, outcome.team_dir.display());
    let _ = writeln!(out, "native only: {}", id_list(&report.native_only));
    let _ = writeln!(out, "project only: {}", id_list(&report.project_only));
    let _ = writeln!(out, "status mismatch: {}", report.status_mismatch.len());
    for mismatch in &report.status_mismatch {
        let _ = writeln!(
            out,
            "  {}: native={} project={}",
            mismatch.id,
            mismatch.native.map_or("-", |status| status.as_str()),
            mismatch.project.map_or("-", |status| status.as_str())
        );
    }
    let _ = writeln!(out, "field mismatch: {}", report.field_mismatch.len());
    for mismatch in &report.field_mismatch {
        for diff in &mismatch.diffs {
            let _ = writeln!(
                out,
                "  {}: {} native={} project={}",
                mismatch.id,
                diff.field,
                diff.native.as_deref().unwrap_or("-"),
                diff.project.as_deref().unwrap_or("-")
            );
        }
    }
    if verbose {
        let _ = writeln!(out, "in sync: {}", id_list(&report.in_sync));
    } else {
        let _ = writeln!(out, "in sync: {}", report.in_sync.len());
    }

    let verb = if dry_run { "would change" } else { "changed" };
    write_changes(&mut out, &format!("project store {verb}"), &outcome.to_project);
    write_changes(&mut out, &format!("native store {verb}"), &outcome.to_native);
    for error in &outcome.errors {
        let _ = writeln!(out, "skipped {}: {}", error.path.display(), error.message);
    }
    for held in &outcome.withheld {
        let _ = writeln!(out, "withheld {} ({} record unreadable)", held.id, held.store);
    }
    out
}

fn write_changes(out: &mut String, label: &str, changes: &[TaskChange]) {
    let _ = writeln!(out, "{label}: {}", changes.len());
    for change in changes {
        match &change.kind {
            ChangeKind::Created => {
                let _ = writeln!(out, "  + {}", change.id);
            }
            ChangeKind::Updated(fields) => {
                let names: Vec<&str> = fields.iter().map(|field| field.as_str()).collect();
                let _ = writeln!(out, "  ~ {} ({})", change.id, names.join(", "));
            }
        }
    }
}

fn id_list(ids: &[String]) -> String {
    if ids.is_empty() {
        "0".to_string()
    } else {
        format!("{} ({})", ids.len(), ids.join(", "))
    }
}

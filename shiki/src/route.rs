//! `shiki route`: pick an engine for one task file or the whole project store.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::routing::{RouteDecision, RoutingPolicy, apply_decision, route};
use crate::io::files::json_files;
use crate::io::task_store::{LoadError, read_task, write_task};
use crate::task::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedTask {
    pub path: PathBuf,
    pub id: String,
    pub status: Option<TaskStatus>,
    pub decision: RouteDecision,
    /// True when the decision was written back to the file.
    pub written: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RouteAllOutcome {
    pub routed: Vec<RoutedTask>,
    pub errors: Vec<LoadError>,
}

/// Route a single task file, writing the decision back unless `dry_run`.
#[instrument(skip(policy))]
pub fn route_file(path: &Path, policy: &RoutingPolicy, dry_run: bool) -> Result<RoutedTask> {
    let mut task = read_task(path)?;
    let decision = route(&task, policy);
    debug!(id = %task.id, primary = %decision.primary, reason = %decision.reason, "routed");

    let written = !dry_run && apply_decision(&mut task, &decision);
    if written {
        write_task(path, &task).with_context(|| format!("write routing decision for {}", task.id))?;
    }
    Ok(RoutedTask {
        path: path.to_path_buf(),
        id: task.id,
        status: task.status,
        decision,
        written,
    })
}

/// Route every `*.json` task under `tasks_dir`. Unreadable files are
/// collected in the outcome and skipped.
pub fn route_all(tasks_dir: &Path, policy: &RoutingPolicy, dry_run: bool) -> Result<RouteAllOutcome> {
    let mut outcome = RouteAllOutcome::default();
    for path in json_files(tasks_dir)? {
        match route_file(&path, policy, dry_run) {
            Ok(routed) => outcome.routed.push(routed),
            Err(err) => outcome.errors.push(LoadError {
                path,
                message: format!("{err:#}"),
            }),
        }
    }
    info!(
        routed = outcome.routed.len(),
        errors = outcome.errors.len(),
        dry_run,
        "route --all done"
    );
    Ok(outcome)
}

/// Fixed-width table of routing decisions.
pub fn format_table(routed: &[RoutedTask]) -> String {
    let id_width = routed
        .iter()
        .map(|task| task.id.len())
        .chain(std::iter::once("TASK".len()))
        .max()
        .unwrap_or(4);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<12}  {:<11}  {:<11}  REASON",
        "TASK", "STATUS", "PRIMARY", "FALLBACK"
    );
    for task in routed {
        let status = task.status.map_or("-", |status| status.as_str());
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<12}  {:<11}  {:<11}  {}",
            task.id,
            status,
            task.decision.primary.as_str(),
            task.decision.fallback.as_str(),
            task.decision.reason
        );
    }
    out
}

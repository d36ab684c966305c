//! Git worktree isolation for task branches.
//!
//! Each branch gets one worktree at `<base_dir>/<branch with '/' -> '_'>`.
//! A worktree moves `absent -> created -> (merged | abandoned) -> removed`;
//! the only state kept outside git is the Worktree Record written inside the
//! worktree itself, so it disappears together with the directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::conflicts::{
    BranchChanges, ConflictReport, branch_dir_name, pairwise_overlaps, task_id_from_branch,
};
use crate::io::config::{RemovalPolicy, WorktreeConfig};
use crate::io::files::{json_files, read_json, write_json};
use crate::io::git::{Git, MergeAttempt, WorktreeInfo};
use crate::io::paths::ShikiPaths;
use crate::io::task_store::ProjectStore;

const RECORD_DIR: &str = ".shiki/state";
const RECORD_PREFIX: &str = "worktree-";
const RECORD_ORIGIN: &str = "worktree_manager";

/// Worktree operations that fail for a reason the caller should see as-is.
#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("ref not found: {0}")]
    MissingRef(String),

    #[error("merge of '{branch}' into {target} has conflicts; merge aborted, back on '{restored}'\n{detail}")]
    MergeConflict {
        branch: String,
        target: String,
        restored: String,
        detail: String,
    },

    #[error("worktree {} has {count} uncommitted change(s); not removing (worktree.removal = \"abort-if-dirty\")", .path.display())]
    Dirty { path: PathBuf, count: usize },

    #[error("conflict check needs at least 2 existing branches (got {0})")]
    TooFewBranches(usize),
}

/// Written to `<worktree>/.shiki/state/worktree-<task>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeRecord {
    pub task_id: String,
    pub branch: String,
    pub worktree_path: String,
    pub created_from: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created { path: PathBuf, new_branch: bool },
    /// The worktree was already registered; nothing changed.
    AlreadyExists { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed { path: PathBuf, discarded: usize },
    /// Git did not know the worktree; a leftover directory may have been deleted.
    NotRegistered { path: PathBuf, removed_dir: bool },
    /// Git still listed the worktree but its directory was gone; only the
    /// stale registration was pruned.
    Pruned { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// False when the branch had nothing new to merge.
    pub committed: bool,
    pub cleanup: Option<CleanupOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub branch: Option<String>,
    pub head: String,
    pub task_id: Option<String>,
    pub task_status: Option<String>,
    pub has_record: bool,
}

pub fn merge_message(branch: &str, target: &str) -> String {
    format!("shiki: merge worktree branch '{branch}' into {target}")
}

pub struct WorktreeManager {
    git: Git,
    base_dir: PathBuf,
    config: WorktreeConfig,
    tasks_dir: PathBuf,
}

impl WorktreeManager {
    /// Manager for the repository containing `start`.
    pub fn open(start: &Path, config: &WorktreeConfig) -> Result<Self> {
        let root = Git::new(start)
            .show_toplevel()
            .context("worktree commands must run inside a git repository")?;
        let base_dir = if config.base_dir.is_absolute() {
            config.base_dir.clone()
        } else {
            normalize(&root.join(&config.base_dir))
        };
        debug!(root = %root.display(), base_dir = %base_dir.display(), "worktree manager");
        Ok(Self {
            tasks_dir: ShikiPaths::new(&root).tasks_dir,
            git: Git::new(root),
            base_dir,
            config: config.clone(),
        })
    }

    pub fn repo_root(&self) -> &Path {
        self.git.workdir()
    }

    pub fn worktree_path(&self, branch: &str) -> PathBuf {
        self.base_dir.join(branch_dir_name(branch))
    }

    fn registered(&self, path: &Path) -> Result<Option<WorktreeInfo>> {
        Ok(self
            .git
            .worktree_list()?
            .into_iter()
            .find(|info| same_path(&info.path, path)))
    }

    /// Create the worktree for `branch`, attaching to the branch if it exists.
    #[instrument(skip(self))]
    pub fn create(&self, branch: &str, task_id: &str) -> Result<CreateOutcome> {
        let path = self.worktree_path(branch);
        if self.registered(&path)?.is_some() {
            warn!(path = %path.display(), "worktree already exists; nothing to do");
            return Ok(CreateOutcome::AlreadyExists { path });
        }

        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("create directory {}", self.base_dir.display()))?;
        let new_branch = !self.git.ref_exists(branch)?;
        if new_branch {
            self.git.worktree_add_new_branch(&path, branch)?;
        } else {
            self.git.worktree_add(&path, branch)?;
        }

        let record = WorktreeRecord {
            task_id: task_id.to_string(),
            branch: branch.to_string(),
            worktree_path: path.display().to_string(),
            created_from: RECORD_ORIGIN.to_string(),
        };
        let record_path = path
            .join(RECORD_DIR)
            .join(format!("{RECORD_PREFIX}{task_id}.json"));
        write_json(&record_path, &record)?;
        info!(path = %path.display(), new_branch, "worktree created");
        Ok(CreateOutcome::Created { path, new_branch })
    }

    /// Remove the worktree for `branch` according to the removal policy.
    #[instrument(skip(self))]
    pub fn cleanup(&self, branch: &str) -> Result<CleanupOutcome> {
        let path = self.worktree_path(branch);
        if self.registered(&path)?.is_none() {
            let mut removed_dir = false;
            if path.exists() {
                match fs::remove_dir_all(&path) {
                    Ok(()) => removed_dir = true,
                    Err(err) => warn!(path = %path.display(), %err, "could not remove leftover directory"),
                }
            }
            self.git.worktree_prune()?;
            warn!(path = %path.display(), "worktree not registered");
            return Ok(CleanupOutcome::NotRegistered { path, removed_dir });
        }

        if !path.is_dir() {
            warn!(path = %path.display(), "worktree directory is missing; pruning registration");
            self.git.worktree_prune()?;
            return Ok(CleanupOutcome::Pruned { path });
        }

        let dirty = match Git::new(&path).dirty_entries_except(&[RECORD_DIR]) {
            Ok(dirty) => dirty,
            Err(err) if self.config.removal == RemovalPolicy::Force => {
                warn!(err = %format!("{err:#}"), "dirty check failed; removing anyway");
                self.remove_by_hand(&path)?;
                return Ok(CleanupOutcome::Removed { path, discarded: 0 });
            }
            Err(err) => {
                self.git.worktree_prune()?;
                return Err(err.context(format!("check {} for uncommitted changes", path.display())));
            }
        };
        if !dirty.is_empty() {
            match self.config.removal {
                RemovalPolicy::AbortIfDirty => {
                    self.git.worktree_prune()?;
                    return Err(WorktreeError::Dirty {
                        path,
                        count: dirty.len(),
                    }
                    .into());
                }
                RemovalPolicy::Force => {
                    for entry in &dirty {
                        warn!(code = %entry.code, file = %entry.path, "discarding uncommitted change");
                    }
                }
            }
        }

        if let Err(err) = self.git.worktree_remove_force(&path) {
            warn!(err = %format!("{err:#}"), "worktree remove failed; deleting the directory");
            self.remove_by_hand(&path)?;
        } else {
            self.git.worktree_prune()?;
        }
        info!(path = %path.display(), discarded = dirty.len(), "worktree removed");
        Ok(CleanupOutcome::Removed {
            path,
            discarded: dirty.len(),
        })
    }

    /// `rm -rf` followed by a prune, for when git cannot remove the worktree.
    fn remove_by_hand(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_dir_all(path).with_context(|| format!("remove {}", path.display()))?;
        }
        self.git.worktree_prune()
    }

    /// Changed-path overlap between every pair of `branches`.
    #[instrument(skip(self))]
    pub fn conflicts(&self, branches: &[String]) -> Result<ConflictReport> {
        if branches.len() < 2 {
            return Err(WorktreeError::TooFewBranches(branches.len()).into());
        }

        let mut resolved = Vec::new();
        let mut skipped = Vec::new();
        for branch in branches {
            if self.git.ref_exists(branch)? {
                resolved.push(branch.as_str());
            } else {
                warn!(branch = %branch, "branch not found; skipping");
                skipped.push(branch.clone());
            }
        }

        if resolved.len() < 2 {
            return Err(WorktreeError::TooFewBranches(resolved.len()).into());
        }

        let octopus = self.git.merge_base_octopus(&resolved)?;
        let (base, degraded_base) = match octopus {
            Some(base) => (base, false),
            None => {
                warn!("no common merge base; comparing against HEAD");
                (self.git.head_sha()?, true)
            }
        };

        let mut changes = Vec::with_capacity(resolved.len());
        for branch in resolved {
            let files = self.git.diff_name_only(&base, branch)?.into_iter().collect();
            changes.push(BranchChanges {
                branch: branch.to_string(),
                files,
            });
        }
        let overlaps = pairwise_overlaps(&changes);
        debug!(overlaps = overlaps.len(), "conflict check done");
        Ok(ConflictReport {
            base,
            degraded_base,
            skipped,
            changes,
            overlaps,
        })
    }

    /// Merge `branch` into `target` in the main checkout, then return to the
    /// branch that was checked out before.
    #[instrument(skip(self))]
    pub fn merge(&self, branch: &str, target: &str) -> Result<MergeOutcome> {
        for rev in [branch, target] {
            if !self.git.ref_exists(rev)? {
                return Err(WorktreeError::MissingRef(rev.to_string()).into());
            }
        }

        let original = match self.git.current_branch() {
            Ok(name) => name,
            Err(_) => self.git.head_sha()?,
        };
        match self.git.merge_base(target, branch) {
            Ok(base) => {
                let stat = self.git.diff_stat(&base, branch).unwrap_or_default();
                info!(%base, "merging\n{stat}");
            }
            Err(err) => debug!(err = %format!("{err:#}"), "no merge base"),
        }

        if original != target {
            self.git.checkout_branch(target)?;
        }
        let merged = self.merge_checked_out(branch, target, &original);
        if original != target {
            if let Err(err) = self.git.checkout_branch(&original) {
                if merged.is_ok() {
                    return Err(err.context(format!("restore branch {original}")));
                }
                warn!(err = %format!("{err:#}"), branch = %original, "could not restore branch");
            }
        }
        let committed = merged?;

        let cleanup = if self.config.cleanup_on_merge {
            Some(self.cleanup(branch)?)
        } else {
            None
        };
        Ok(MergeOutcome { committed, cleanup })
    }

    fn merge_checked_out(&self, branch: &str, target: &str, original: &str) -> Result<bool> {
        match self.git.merge_no_commit(branch)? {
            MergeAttempt::Conflict { stderr } => {
                if let Err(err) = self.git.merge_abort() {
                    warn!(err = %format!("{err:#}"), "merge --abort failed");
                }
                Err(WorktreeError::MergeConflict {
                    branch: branch.to_string(),
                    target: target.to_string(),
                    restored: original.to_string(),
                    detail: stderr,
                }
                .into())
            }
            MergeAttempt::Clean => {
                if !self.git.merge_in_progress()? {
                    info!(branch, "already up to date");
                    return Ok(false);
                }
                self.git.commit(&merge_message(branch, target))?;
                info!(branch, target, "merged");
                Ok(true)
            }
        }
    }

    /// Every worktree git knows about, with its task association.
    pub fn list(&self) -> Result<Vec<WorktreeEntry>> {
        let store = ProjectStore::new(&self.tasks_dir);
        let mut entries = Vec::new();
        for info in self.git.worktree_list()? {
            if info.is_bare {
                continue;
            }
            let record = read_record(&info.path);
            let task_id = record
                .as_ref()
                .map(|record| record.task_id.clone())
                .or_else(|| {
                    info.branch
                        .as_deref()
                        .and_then(task_id_from_branch)
                        .map(ToString::to_string)
                });
            let task_status = task_id
                .as_deref()
                .and_then(|id| store.find(id))
                .and_then(|task| task.status)
                .map(|status| status.as_str().to_string());
            entries.push(WorktreeEntry {
                path: info.path,
                branch: info.branch,
                head: info.head,
                task_id,
                task_status,
                has_record: record.is_some(),
            });
        }
        Ok(entries)
    }
}

fn read_record(worktree: &Path) -> Option<WorktreeRecord> {
    let files = json_files(&worktree.join(RECORD_DIR)).ok()?;
    files
        .iter()
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(RECORD_PREFIX))
        })
        .find_map(|path| {
            read_json::<WorktreeRecord>(path)
                .inspect_err(|err| debug!(path = %path.display(), err = %format!("{err:#}"), "bad worktree record"))
                .ok()
        })
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn same_path(left: &Path, right: &Path) -> bool {
    let canonical = |path: &Path| fs::canonicalize(path).unwrap_or_else(|_| normalize(path));
    canonical(left) == canonical(right)
}

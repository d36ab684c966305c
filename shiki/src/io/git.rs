//! Git adapter for shiki commands.
//!
//! Every call is a synchronous `git` subprocess in a fixed working directory.
//! Failures carry git's stderr verbatim.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// One record of `git worktree list --porcelain`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub head: String,
    /// Short branch name (without `refs/heads/`).
    pub branch: Option<String>,
    pub is_bare: bool,
    pub is_detached: bool,
}

/// Result of `git merge --no-commit --no-ff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAttempt {
    Clean,
    Conflict { stderr: String },
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Absolute path of the repository's top-level directory.
    pub fn show_toplevel(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to run)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    pub fn head_sha(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// True if `rev` resolves to a commit.
    pub fn ref_exists(&self, rev: &str) -> Result<bool> {
        let spec = format!("{rev}^{{commit}}");
        let status = self
            .run(&["rev-parse", "--verify", "--quiet", &spec])?
            .status;
        Ok(status.success())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Status entries whose path does not start with any of `ignored_prefixes`.
    #[instrument(skip_all)]
    pub fn dirty_entries_except(&self, ignored_prefixes: &[&str]) -> Result<Vec<StatusEntry>> {
        let entries: Vec<StatusEntry> = self
            .status_porcelain()?
            .into_iter()
            .filter(|entry| {
                !ignored_prefixes
                    .iter()
                    .any(|prefix| entry.path.starts_with(prefix))
            })
            .collect();
        debug!(dirty = entries.len(), "collected dirty entries");
        Ok(entries)
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    pub fn worktree_list(&self) -> Result<Vec<WorktreeInfo>> {
        let out = self.run_capture(&["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_porcelain(&out))
    }

    /// Attach a new worktree at `path` to an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn worktree_add(&self, path: &Path, branch: &str) -> Result<()> {
        let path = path.to_string_lossy();
        self.run_checked(&["worktree", "add", &path, branch])?;
        Ok(())
    }

    /// Create `branch` at HEAD and a worktree for it at `path`.
    #[instrument(skip_all, fields(branch))]
    pub fn worktree_add_new_branch(&self, path: &Path, branch: &str) -> Result<()> {
        let path = path.to_string_lossy();
        self.run_checked(&["worktree", "add", "-b", branch, &path])?;
        Ok(())
    }

    /// `git worktree remove --force`; discards uncommitted changes.
    #[instrument(skip_all)]
    pub fn worktree_remove_force(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.run_checked(&["worktree", "remove", "--force", &path])?;
        Ok(())
    }

    pub fn worktree_prune(&self) -> Result<()> {
        self.run_checked(&["worktree", "prune"])?;
        Ok(())
    }

    /// Best common ancestor of all `revs`, or `None` if they share none.
    pub fn merge_base_octopus(&self, revs: &[&str]) -> Result<Option<String>> {
        let mut args = vec!["merge-base", "--octopus"];
        args.extend_from_slice(revs);
        let output = self.run(&args)?;
        let base = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || base.is_empty() {
            debug!(stderr = %String::from_utf8_lossy(&output.stderr).trim(), "no octopus merge base");
            return Ok(None);
        }
        Ok(Some(base))
    }

    pub fn merge_base(&self, left: &str, right: &str) -> Result<String> {
        let out = self.run_capture(&["merge-base", left, right])?;
        Ok(out.trim().to_string())
    }

    /// Paths changed between `base` and `rev`.
    pub fn diff_name_only(&self, base: &str, rev: &str) -> Result<Vec<String>> {
        let out = self.run_capture(&["diff", "--name-only", base, rev])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    pub fn diff_stat(&self, base: &str, rev: &str) -> Result<String> {
        let out = self.run_capture(&["diff", "--stat", base, rev])?;
        Ok(out.trim_end().to_string())
    }

    /// Merge `branch` into the checked-out branch without committing.
    #[instrument(skip_all, fields(branch))]
    pub fn merge_no_commit(&self, branch: &str) -> Result<MergeAttempt> {
        let output = self.run(&["merge", "--no-commit", "--no-ff", branch])?;
        if output.status.success() {
            return Ok(MergeAttempt::Clean);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        warn!(branch, "merge did not apply cleanly");
        Ok(MergeAttempt::Conflict {
            stderr: if stderr.is_empty() { stdout } else { stderr },
        })
    }

    pub fn merge_abort(&self) -> Result<()> {
        self.run_checked(&["merge", "--abort"])?;
        Ok(())
    }

    /// True while a merge awaits its commit (`MERGE_HEAD` exists).
    pub fn merge_in_progress(&self) -> Result<bool> {
        let status = self
            .run(&["rev-parse", "--verify", "--quiet", "MERGE_HEAD"])?
            .status;
        Ok(status.success())
    }

    #[instrument(skip_all)]
    pub fn commit(&self, message: &str) -> Result<()> {
        debug!("committing");
        self.run_checked(&["commit", "-m", message])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(args = %args.join(" "), "git");
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

/// Parse `git worktree list --porcelain` output.
pub fn parse_worktree_porcelain(output: &str) -> Vec<WorktreeInfo> {
    let mut worktrees = Vec::new();
    let mut current: Option<WorktreeInfo> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            worktrees.extend(current.take());
            current = Some(WorktreeInfo {
                path: PathBuf::from(path),
                ..WorktreeInfo::default()
            });
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        if let Some(head) = line.strip_prefix("HEAD ") {
            entry.head = head.to_string();
        } else if let Some(branch) = line.strip_prefix("branch ") {
            let short = branch.strip_prefix("refs/heads/").unwrap_or(branch);
            entry.branch = Some(short.to_string());
        } else if line == "bare" {
            entry.is_bare = true;
        } else if line == "detached" {
            entry.is_detached = true;
        }
    }
    worktrees.extend(current);
    worktrees
}

//! Test-only helpers: throwaway git repositories and task records.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::paths::ShikiPaths;
use crate::task::{Task, TaskStatus};

/// A git repository at `<tempdir>/repo` with one commit on `main`.
///
/// The repository sits one level down so the default worktree base dir
/// (`../worktrees`) stays inside the temp dir.
pub struct TestRepo {
    _temp: TempDir,
    root: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let root = temp.path().join("repo");
        fs::create_dir_all(&root).with_context(|| format!("create {}", root.display()))?;
        let root = fs::canonicalize(&root).with_context(|| format!("canonicalize {}", root.display()))?;
        let repo = Self { _temp: temp, root };

        repo.git(&["init"])?;
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "user.name", "test"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        fs::write(repo.root.join("README.md"), "hi\n").context("write README.md")?;
        repo.git(&["add", "README.md"])?;
        repo.git(&["commit", "-m", "chore: init"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self) -> ShikiPaths {
        ShikiPaths::new(&self.root)
    }

    /// Run git in the repository and return stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub fn current_branch(&self) -> Result<String> {
        Ok(self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?.trim().to_string())
    }

    /// Commit `contents` to `file` on `branch` (created from `main` if
    /// missing), then switch back to `main`.
    pub fn commit_on_branch(&self, branch: &str, file: &str, contents: &str) -> Result<()> {
        let exists = self
            .git(&["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .is_ok();
        if exists {
            self.git(&["checkout", branch])?;
        } else {
            self.git(&["checkout", "-b", branch, "main"])?;
        }
        let path = self.root.join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        self.git(&["add", file])?;
        self.git(&["commit", "-m", &format!("change {file} on {branch}")])?;
        self.git(&["checkout", "main"])?;
        Ok(())
    }

    /// Write a raw project store record; the id is read from the JSON.
    pub fn write_task(&self, raw: &str) -> Result<PathBuf> {
        let task: Task = serde_json::from_str(raw).context("parse task json")?;
        let path = self.paths().task_path(&task.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, raw).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// A task with the given status and no routing hints.
pub fn task(id: &str, status: TaskStatus) -> Task {
    Task {
        status: Some(status),
        ..Task::new(id, format!("{id} title"))
    }
}

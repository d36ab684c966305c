//! Canonical locations inside a project's `.shiki/` directory.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// All canonical paths within `.shiki/` for a project root.
#[derive(Debug, Clone)]
pub struct ShikiPaths {
    pub root: PathBuf,
    pub shiki_dir: PathBuf,
    pub config_path: PathBuf,
    pub tasks_dir: PathBuf,
    pub dag_dir: PathBuf,
    pub contracts_dir: PathBuf,
    pub state_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl ShikiPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let shiki_dir = root.join(".shiki");
        Self {
            root: root.clone(),
            config_path: shiki_dir.join("config.toml"),
            tasks_dir: shiki_dir.join("tasks"),
            dag_dir: shiki_dir.join("dag"),
            contracts_dir: shiki_dir.join("contracts"),
            state_dir: shiki_dir.join("state"),
            gitignore_path: shiki_dir.join(".gitignore"),
            shiki_dir,
        }
    }

    /// Project store record for a task id.
    pub fn task_path(&self, task_id: &str) -> PathBuf {
        self.tasks_dir.join(format!("{task_id}.json"))
    }

    /// Resolve paths for the project containing the current directory.
    pub fn discover() -> Result<Self> {
        let cwd = env::current_dir().context("read current directory")?;
        Ok(Self::new(find_project_root(&cwd)?))
    }
}

/// Walk up from `start` to the nearest directory holding `.shiki/`.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    for candidate in start.ancestors() {
        if candidate.join(".shiki").is_dir() {
            debug!(root = %candidate.display(), "found project root");
            return Ok(candidate.to_path_buf());
        }
    }
    Err(anyhow!(
        "no .shiki directory found in {} or any parent (run `shiki init`)",
        start.display()
    ))
}

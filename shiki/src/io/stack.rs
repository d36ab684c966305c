//! Stack detection by scanning the project tree.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::core::roles::StackSignals;

const NODE_MARKERS: [&str; 3] = ["package.json", "pnpm-lock.yaml", "yarn.lock"];
const PYTHON_MARKERS: [&str; 3] = ["requirements.txt", "pyproject.toml", "poetry.lock"];
const INFRA_MARKERS: [&str; 3] = ["Dockerfile", "docker-compose.yml", "compose.yml"];
const OPENAPI_MARKERS: [&str; 2] = ["openapi.yaml", "openapi.yml"];

/// Directories never descended into.
const SKIPPED_DIRS: [&str; 5] = [".git", ".shiki", "node_modules", "target", ".venv"];

#[instrument(skip_all, fields(root = %root.display()))]
pub fn detect_stack(root: &Path) -> Result<StackSignals> {
    let mut signals = StackSignals {
        node: has_marker(root, &NODE_MARKERS),
        python: has_marker(root, &PYTHON_MARKERS),
        infra: has_marker(root, &INFRA_MARKERS)
            || root.join("infra").is_dir()
            || root.join(".github/workflows").is_dir(),
        openapi: has_marker(root, &OPENAPI_MARKERS),
    };

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.path() == root || !skipped(entry));
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        match entry.path().extension().and_then(|ext| ext.to_str()) {
            Some("ts" | "tsx") => signals.node = true,
            Some("py") => signals.python = true,
            Some("yml" | "yaml") if name.starts_with("openapi") => signals.openapi = true,
            _ => {}
        }
    }

    debug!(?signals, "stack detected");
    Ok(signals)
}

fn has_marker(root: &Path, markers: &[&str]) -> bool {
    markers.iter().any(|name| root.join(name).exists())
}

fn skipped(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && SKIPPED_DIRS
            .iter()
            .any(|name| entry.file_name().to_string_lossy() == *name)
}

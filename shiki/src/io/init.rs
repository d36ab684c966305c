//! Scaffolding for `.shiki/`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::config::{ShikiConfig, write_config};
use super::paths::ShikiPaths;
use super::schema::ArtifactKind;

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Rewrite config, schemas and `.gitignore`. Task, DAG and session
    /// records are never touched.
    pub force: bool,
}

/// Create `.shiki/` scaffolding in `root`.
///
/// Fails if `.shiki/` already exists unless `options.force` is set.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<ShikiPaths> {
    let paths = ShikiPaths::new(root);
    if paths.shiki_dir.exists() && !paths.shiki_dir.is_dir() {
        return Err(anyhow!("shiki init: .shiki exists but is not a directory"));
    }
    if paths.shiki_dir.exists() && !options.force {
        return Err(anyhow!(
            "shiki init: .shiki already exists (use --force to overwrite)"
        ));
    }

    for dir in [
        &paths.shiki_dir,
        &paths.tasks_dir,
        &paths.dag_dir,
        &paths.contracts_dir,
        &paths.state_dir,
    ] {
        create_dir(dir)?;
    }
    let schemas_dir = paths.shiki_dir.join("schemas");
    create_dir(&schemas_dir)?;
    for kind in ArtifactKind::ALL {
        write_file(&schemas_dir.join(kind.file_name()), kind.schema_source())?;
    }

    write_config(&paths.config_path, &default_config(root))?;
    write_file(&paths.gitignore_path, SHIKI_GITIGNORE)?;
    info!(root = %root.display(), "initialized .shiki");
    Ok(paths)
}

fn default_config(root: &Path) -> ShikiConfig {
    ShikiConfig {
        name: root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.trim().is_empty()),
        ..ShikiConfig::default()
    }
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const SHIKI_GITIGNORE: &str = "state/worktree-*.json\n*.tmp\n";

//! The two task stores: the project store (`.shiki/tasks/`) and the agent
//! runtime's native team store (`<teams_dir>/<team>/`).
//!
//! Both sit behind [`TaskStore`]. Only the reconciler writes across them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::io::files::{json_files, read_json, write_json};
use crate::task::Task;

/// Read one task record, taking the id from the file stem when absent.
pub fn read_task(path: &Path) -> Result<Task> {
    let mut task: Task = read_json(path)?;
    if task.id.trim().is_empty() {
        task.id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("task file has no name: {}", path.display()))?;
    }
    Ok(task)
}

pub fn write_task(path: &Path, task: &Task) -> Result<()> {
    debug!(path = %path.display(), id = %task.id, "writing task");
    write_json(path, task)
}

/// A record that could not be loaded. Loading continues past it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub path: PathBuf,
    pub message: String,
}

/// Tasks keyed by id plus the file each was read from.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub tasks: BTreeMap<String, Task>,
    /// Absent for records that did not come from their own file.
    pub sources: BTreeMap<String, PathBuf>,
    pub errors: Vec<LoadError>,
    /// File stems of records that failed to load. Writing `<id>.json` for
    /// one of these would replace a file nobody has read.
    pub unreadable: BTreeSet<String>,
}

impl StoreSnapshot {
    fn insert(&mut self, task: Task, source: Option<PathBuf>) {
        if let Some(path) = source {
            self.sources.insert(task.id.clone(), path);
        }
        self.tasks.insert(task.id.clone(), task);
    }

    fn load_files(&mut self, dir: &Path) -> Result<()> {
        for path in json_files(dir)? {
            match read_task(&path) {
                Ok(task) => {
                    if let Some(previous) = self.sources.get(&task.id) {
                        warn!(
                            id = %task.id,
                            kept = %previous.display(),
                            ignored = %path.display(),
                            "duplicate task id"
                        );
                        continue;
                    }
                    self.insert(task, Some(path));
                }
                Err(err) => {
                    warn!(path = %path.display(), err = %format!("{err:#}"), "skipping task file");
                    if let Some(stem) = path.file_stem() {
                        self.unreadable.insert(stem.to_string_lossy().into_owned());
                    }
                    self.errors.push(LoadError {
                        path,
                        message: format!("{err:#}"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Read/write access to one store of task records.
pub trait TaskStore {
    /// Human-readable store name for logs and reports.
    fn label(&self) -> &'static str;

    fn load(&self) -> Result<StoreSnapshot>;

    /// Persist `task`, rewriting `source` when the record came from a file.
    fn save(&self, task: &Task, source: Option<&Path>) -> Result<PathBuf>;
}

/// `.shiki/tasks/*.json`.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    tasks_dir: PathBuf,
}

impl ProjectStore {
    pub fn new(tasks_dir: impl Into<PathBuf>) -> Self {
        Self {
            tasks_dir: tasks_dir.into(),
        }
    }

    pub fn tasks_dir(&self) -> &Path {
        &self.tasks_dir
    }

    /// Status lookup by id, `None` if the record is missing or unreadable.
    pub fn find(&self, task_id: &str) -> Option<Task> {
        let path = self.tasks_dir.join(format!("{task_id}.json"));
        if !path.is_file() {
            return None;
        }
        read_task(&path)
            .inspect_err(|err| warn!(path = %path.display(), err = %format!("{err:#}"), "unreadable task"))
            .ok()
    }
}

impl TaskStore for ProjectStore {
    fn label(&self) -> &'static str {
        "project"
    }

    #[instrument(skip_all, fields(dir = %self.tasks_dir.display()))]
    fn load(&self) -> Result<StoreSnapshot> {
        let mut snapshot = StoreSnapshot::default();
        snapshot.load_files(&self.tasks_dir)?;
        debug!(tasks = snapshot.tasks.len(), errors = snapshot.errors.len(), "loaded project store");
        Ok(snapshot)
    }

    fn save(&self, task: &Task, source: Option<&Path>) -> Result<PathBuf> {
        let path = source.map_or_else(
            || self.tasks_dir.join(format!("{}.json", task.id)),
            Path::to_path_buf,
        );
        write_task(&path, task)?;
        Ok(path)
    }
}

#[derive(Debug, Default, Deserialize)]
struct TeamConfig {
    #[serde(default)]
    tasks: Vec<Task>,
}

/// `<teams_dir>/<team>/tasks/*.json` plus `tasks[]` in the team's
/// `config.json`. File records win over config entries with the same id.
#[derive(Debug, Clone)]
pub struct TeamStore {
    team_dir: PathBuf,
}

impl TeamStore {
    pub fn new(teams_dir: &Path, team_name: &str) -> Result<Self> {
        let name = team_name.trim();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(anyhow!("invalid team name {team_name:?}"));
        }
        Ok(Self {
            team_dir: teams_dir.join(name),
        })
    }

    pub fn team_dir(&self) -> &Path {
        &self.team_dir
    }

    fn tasks_dir(&self) -> PathBuf {
        self.team_dir.join("tasks")
    }

    fn config_path(&self) -> PathBuf {
        self.team_dir.join("config.json")
    }
}

impl TaskStore for TeamStore {
    fn label(&self) -> &'static str {
        "native"
    }

    #[instrument(skip_all, fields(dir = %self.team_dir.display()))]
    fn load(&self) -> Result<StoreSnapshot> {
        let mut snapshot = StoreSnapshot::default();
        if !self.team_dir.is_dir() {
            warn!("team directory does not exist");
            return Ok(snapshot);
        }
        snapshot.load_files(&self.tasks_dir())?;

        let config_path = self.config_path();
        if config_path.is_file() {
            match read_json::<TeamConfig>(&config_path) {
                Ok(config) => {
                    for task in config.tasks {
                        if task.id.trim().is_empty() {
                            debug!("ignoring config task without id");
                            continue;
                        }
                        if !snapshot.tasks.contains_key(&task.id) {
                            snapshot.insert(task, None);
                        }
                    }
                }
                Err(err) => {
                    warn!(path = %config_path.display(), err = %format!("{err:#}"), "skipping team config");
                    snapshot.errors.push(LoadError {
                        path: config_path,
                        message: format!("{err:#}"),
                    });
                }
            }
        }

        debug!(tasks = snapshot.tasks.len(), errors = snapshot.errors.len(), "loaded team store");
        Ok(snapshot)
    }

    fn save(&self, task: &Task, source: Option<&Path>) -> Result<PathBuf> {
        let path = source.map_or_else(
            || self.tasks_dir().join(format!("{}.json", task.id)),
            Path::to_path_buf,
        );
        write_task(&path, task).with_context(|| format!("save {} task {}", self.label(), task.id))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use std::fs;

    #[test]
    fn project_store_fills_missing_ids_and_reports_bad_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("tasks");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("T-1.json"), r#"{"title":"no id","status":"pending"}"#).expect("write");
        fs::write(dir.join("T-2.json"), "{not json").expect("write");

        let snapshot = ProjectStore::new(&dir).load().expect("load");
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.tasks["T-1"].status, Some(TaskStatus::Pending));
        assert_eq!(snapshot.errors.len(), 1);
        assert!(snapshot.errors[0].path.ends_with("T-2.json"));
        assert!(snapshot.unreadable.contains("T-2"));
    }

    #[test]
    fn team_store_merges_files_and_config_entries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let team_dir = temp.path().join("alpha");
        fs::create_dir_all(team_dir.join("tasks")).expect("mkdir");
        fs::write(
            team_dir.join("tasks/T-1.json"),
            r#"{"id":"T-1","status":"completed"}"#,
        )
        .expect("write");
        fs::write(
            team_dir.join("config.json"),
            r#"{"name":"alpha","tasks":[{"id":"T-1","status":"pending"},{"id":"T-2","status":"in_progress"},{"title":"anonymous"}]}"#,
        )
        .expect("write");

        let store = TeamStore::new(temp.path(), "alpha").expect("store");
        let snapshot = store.load().expect("load");
        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(snapshot.tasks["T-1"].status, Some(TaskStatus::Completed));
        assert_eq!(snapshot.tasks["T-2"].status, Some(TaskStatus::InProgress));
        assert!(snapshot.sources.contains_key("T-1"));
        assert!(!snapshot.sources.contains_key("T-2"));

        let written = store
            .save(&snapshot.tasks["T-2"], None)
            .expect("save");
        assert_eq!(written, team_dir.join("tasks/T-2.json"));
        assert_eq!(read_task(&written).expect("read").id, "T-2");
    }

    #[test]
    fn missing_team_dir_is_an_empty_store() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TeamStore::new(temp.path(), "ghost").expect("store");
        assert!(store.load().expect("load").tasks.is_empty());
    }

    #[test]
    fn team_names_cannot_escape_the_teams_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(TeamStore::new(temp.path(), "../other").is_err());
        assert!(TeamStore::new(temp.path(), "  ").is_err());
    }
}

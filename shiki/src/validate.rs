//! `shiki validate`: schema, cycle, contract and budget checks over `.shiki/`.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::budget::check_budgets;
use crate::core::dag::{Dag, batch_order_warnings, validate_acyclic};
use crate::io::config::ShikiConfig;
use crate::io::files::json_files;
use crate::io::paths::ShikiPaths;
use crate::io::schema::{ArtifactKind, SchemaSet};
use crate::task::Task;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: &'static str,
    pub path: Option<PathBuf>,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "[{}] {}: {}", self.kind, path.display(), self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub checked: usize,
    pub errors: Vec<Finding>,
    /// Reported but never fail validation.
    pub warnings: Vec<Finding>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, kind: &'static str, path: Option<&Path>, message: impl Into<String>) {
        self.errors.push(Finding {
            kind,
            path: path.map(Path::to_path_buf),
            message: message.into(),
        });
    }

    fn warning(&mut self, kind: &'static str, path: Option<&Path>, message: impl Into<String>) {
        self.warnings.push(Finding {
            kind,
            path: path.map(Path::to_path_buf),
            message: message.into(),
        });
    }

    /// One line per finding plus the verdict.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        lines.extend(self.errors.iter().map(|finding| format!("ERROR {finding}")));
        lines.extend(self.warnings.iter().map(|finding| format!("WARN  {finding}")));
        if self.is_ok() {
            lines.push(format!("Validation OK ({} file(s) checked)", self.checked));
        } else {
            lines.push(format!("Validation failed: {} error(s)", self.errors.len()));
        }
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

/// Validate every artifact under `.shiki/`.
#[instrument(skip_all, fields(root = %paths.root.display()))]
pub fn validate_project(paths: &ShikiPaths, config: &ShikiConfig) -> Result<ValidationReport> {
    let schemas = SchemaSet::load()?;
    let mut report = ValidationReport::default();

    let mut tasks = Vec::new();
    for path in json_files(&paths.tasks_dir)? {
        let Some(checked) = check_file(&schemas, ArtifactKind::Task, &path, &mut report)? else {
            continue;
        };
        match serde_json::from_value::<Task>(checked.value) {
            Ok(task) => tasks.push((path, task)),
            Err(err) if checked.schema_ok => {
                report.error(ArtifactKind::Task.label(), Some(&path), err.to_string());
            }
            Err(_) => {}
        }
    }

    let mut contract_ids = BTreeSet::new();
    for path in json_files(&paths.contracts_dir)? {
        let Some(checked) = check_file(&schemas, ArtifactKind::Contract, &path, &mut report)? else {
            continue;
        };
        if let Some(id) = checked.value.get("contract_id").and_then(Value::as_str) {
            contract_ids.insert(id.to_string());
        }
        if let Some(stem) = path.file_stem() {
            contract_ids.insert(stem.to_string_lossy().into_owned());
        }
    }
    for (path, task) in &tasks {
        let Some(contract) = task
            .context
            .as_ref()
            .and_then(|context| context.contract_ref.as_deref())
            .map(str::trim)
            .filter(|contract| !contract.is_empty())
        else {
            continue;
        };
        if !contract_ids.contains(contract) && !paths.root.join(contract).is_file() {
            report.warning(
                ArtifactKind::Task.label(),
                Some(path),
                format!("context.contract_ref {contract:?} matches no contract"),
            );
        }
    }

    for path in json_files(&paths.dag_dir)? {
        let Some(checked) = check_file(&schemas, ArtifactKind::Dag, &path, &mut report)? else {
            continue;
        };
        // Cycle detection still runs when only the schema check failed.
        let dag: Dag = match serde_json::from_value(checked.value) {
            Ok(dag) => dag,
            Err(err) => {
                if checked.schema_ok {
                    report.error(ArtifactKind::Dag.label(), Some(&path), err.to_string());
                }
                continue;
            }
        };
        if let Err(err) = validate_acyclic(&dag) {
            report.error(ArtifactKind::Dag.label(), Some(&path), err.to_string());
        }
        for warning in batch_order_warnings(&dag) {
            report.warning(ArtifactKind::Dag.label(), Some(&path), warning.to_string());
        }
    }

    for path in json_files(&paths.state_dir)? {
        let is_session = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("session-"));
        if is_session {
            check_file(&schemas, ArtifactKind::Session, &path, &mut report)?;
        }
    }

    let tasks: Vec<Task> = tasks.into_iter().map(|(_, task)| task).collect();
    for violation in check_budgets(&tasks, config.budget.limits()) {
        report.error("BUDGET", None, violation.to_string());
    }

    debug!(
        checked = report.checked,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "validation done"
    );
    Ok(report)
}

/// A file that parsed as JSON.
struct Checked {
    value: Value,
    /// False when schema violations were already reported for it.
    schema_ok: bool,
}

/// Parse and schema-check one file. `None` when it is not valid JSON.
fn check_file(
    schemas: &SchemaSet,
    kind: ArtifactKind,
    path: &Path,
    report: &mut ValidationReport,
) -> Result<Option<Checked>> {
    report.checked += 1;
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value: Value = match serde_json::from_str(&contents) {
        Ok(value) => value,
        Err(err) => {
            report.error(kind.label(), Some(path), format!("invalid JSON: {err}"));
            return Ok(None);
        }
    };
    let violations = schemas.violations(kind, &value);
    let schema_ok = violations.is_empty();
    for violation in violations {
        report.error(kind.label(), Some(path), violation);
    }
    Ok(Some(Checked { value, schema_ok }))
}

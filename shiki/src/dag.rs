//! `shiki dag check` and `shiki dag render`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use crate::core::dag::{BatchOrderWarning, Dag, batch_order_warnings, batches, validate_acyclic};
use crate::core::mermaid::{self, Direction};
use crate::io::files::{json_files, read_json};

pub fn load_dag(path: &Path) -> Result<Dag> {
    read_json(path)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagCheck {
    pub dag_id: String,
    /// `(batch, node count)` in execution order.
    pub batches: Vec<(u32, usize)>,
    pub warnings: Vec<BatchOrderWarning>,
}

impl DagCheck {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "DAG {}: acyclic", self.dag_id);
        for (batch, count) in &self.batches {
            let _ = writeln!(out, "  batch {batch}: {count} node(s)");
        }
        out
    }
}

/// Fails with the cycle error when the DAG is not acyclic.
pub fn check_dag(path: &Path) -> Result<DagCheck> {
    let dag = load_dag(path)?;
    validate_acyclic(&dag).with_context(|| format!("check {}", path.display()))?;
    let warnings = batch_order_warnings(&dag);
    for warning in &warnings {
        warn!(dag = %dag.dag_id, "{warning}");
    }
    Ok(DagCheck {
        batches: batches(&dag)
            .into_iter()
            .map(|(batch, nodes)| (batch, nodes.len()))
            .collect(),
        dag_id: dag.dag_id,
        warnings,
    })
}

/// Mermaid graph followed by the text summary. `wrap` fences the graph for
/// markdown.
pub fn render_dag(path: &Path, direction: Direction, wrap: bool) -> Result<String> {
    let dag = load_dag(path)?;
    let graph = mermaid::render(&dag, direction);
    let mut out = String::new();
    if wrap {
        let _ = write!(out, "```mermaid\n{graph}```\n");
    } else {
        out.push_str(&graph);
    }
    out.push('\n');
    out.push_str(&mermaid::summary(&dag));
    Ok(out)
}

/// Render every DAG file under `dag_dir`; failures are returned per file.
pub fn render_all(dag_dir: &Path, direction: Direction, wrap: bool) -> Result<Vec<(PathBuf, Result<String>)>> {
    Ok(json_files(dag_dir)?
        .into_iter()
        .map(|path| {
            let rendered = render_dag(&path, direction, wrap);
            (path, rendered)
        })
        .collect())
}

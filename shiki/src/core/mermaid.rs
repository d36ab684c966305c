//! Mermaid rendering of DAG plans for issue and PR comments.

use std::fmt::Write as _;

use crate::core::dag::{Dag, EdgeKind, batches};

/// Layout direction of the rendered graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    TopToBottom,
    LeftToRight,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::TopToBottom => "TB",
            Direction::LeftToRight => "LR",
        }
    }
}

const STATUS_STYLES: [(&str, &str); 5] = [
    ("pending", "fill:#e0e0e0,stroke:#999,color:#333"),
    ("running", "fill:#42a5f5,stroke:#1565c0,color:#fff"),
    ("completed", "fill:#66bb6a,stroke:#2e7d32,color:#fff"),
    ("failed", "fill:#ef5350,stroke:#c62828,color:#fff"),
    ("skipped", "fill:#ffa726,stroke:#e65100,color:#fff"),
];

fn engine_shape(engine: Option<&str>) -> (&'static str, &'static str) {
    match engine {
        Some("codex") => ("[/", "/]"),
        Some("claude-team") => ("[[", "]]"),
        Some("claude-leader") => ("{{", "}}"),
        Some("claude-member") => ("([", "])"),
        Some("human") => ("[(", ")]"),
        _ => ("[", "]"),
    }
}

/// Mermaid identifiers cannot contain `-`, `/` or spaces.
pub fn sanitize_id(node_id: &str) -> String {
    node_id.replace(['-', '/', ' '], "_")
}

/// Render a DAG as a Mermaid `graph`, one subgraph per batch.
pub fn render(dag: &Dag, direction: Direction) -> String {
    let mut out = String::new();
    let current_batch = dag.metadata.current_batch;

    let _ = writeln!(out, "graph {}", direction.as_str());
    let _ = writeln!(out, "    %% DAG: {} | Status: {}", dag.dag_id, dag.status);
    let _ = writeln!(
        out,
        "    %% Batches: {} | Current: {}",
        dag.metadata.total_batches, current_batch
    );
    out.push('\n');

    let grouped = batches(dag);
    for (batch, nodes) in &grouped {
        let indicator = if nodes.iter().all(|node| node.status == "completed") {
            " [DONE]"
        } else if nodes.iter().any(|node| node.status == "running") {
            " [RUNNING]"
        } else if nodes.iter().any(|node| node.status == "failed") {
            " [FAILED]"
        } else {
            ""
        };
        let _ = writeln!(out, "    subgraph batch{batch}[\"Batch {batch}{indicator}\"]");
        for node in nodes {
            let mut label = vec![node.task_id.clone()];
            if let Some(engine) = &node.engine {
                label.push(format!("[{engine}]"));
            }
            match (node.actual_tokens, node.estimated_tokens) {
                (Some(actual), _) if actual > 0 => label.push(format!("({actual}tok)")),
                (_, Some(estimated)) if estimated > 0 => {
                    label.push(format!("(~{estimated}tok)"));
                }
                _ => {}
            }
            let (open, close) = engine_shape(node.engine.as_deref());
            let _ = writeln!(
                out,
                "        {}{open}\"{}\"{close}",
                sanitize_id(&node.node_id),
                label.join(" ")
            );
        }
        out.push_str("    end\n\n");
    }

    if !dag.edges.is_empty() {
        out.push_str("    %% Dependencies\n");
        for edge in &dag.edges {
            let arrow = match edge.kind {
                EdgeKind::DependsOn => "-->",
                EdgeKind::Blocks => "-.-x",
                EdgeKind::Suggests => "-.->",
            };
            let _ = writeln!(
                out,
                "    {} {arrow} {}",
                sanitize_id(&edge.from),
                sanitize_id(&edge.to)
            );
        }
        out.push('\n');
    }

    out.push_str("    %% Status styles\n");
    for (status, style) in STATUS_STYLES {
        for node in dag.nodes.iter().filter(|node| node.status == status) {
            let _ = writeln!(out, "    style {} {style}", sanitize_id(&node.node_id));
        }
    }

    out.push_str("\n    %% Batch subgraph styles\n");
    for batch in grouped.keys() {
        let style = if *batch < current_batch {
            "fill:#f0f0f0,stroke:#ccc"
        } else if *batch == current_batch {
            "fill:#e3f2fd,stroke:#1565c0,stroke-width:2px"
        } else {
            "fill:#fafafa,stroke:#ddd"
        };
        let _ = writeln!(out, "    style batch{batch} {style}");
    }

    out.trim_end().to_string()
}

/// Markdown summary: node counts per status and token totals.
pub fn summary(dag: &Dag) -> String {
    let count = |status: &str| dag.nodes.iter().filter(|node| node.status == status).count();
    let estimated: u64 = dag.nodes.iter().filter_map(|node| node.estimated_tokens).sum();
    let actual: u64 = dag.nodes.iter().filter_map(|node| node.actual_tokens).sum();

    let mut lines = vec![
        format!("**DAG:** {} | **Status:** {}", dag.dag_id, dag.status),
        format!(
            "**Batches:** {} | **Current:** {}",
            dag.metadata.total_batches, dag.metadata.current_batch
        ),
        format!(
            "**Nodes:** {} total | {} completed | {} running | {} pending | {} failed | {} skipped",
            dag.nodes.len(),
            count("completed"),
            count("running"),
            count("pending"),
            count("failed"),
            count("skipped"),
        ),
    ];
    if estimated > 0 || actual > 0 {
        lines.push(format!("**Tokens:** {actual} actual / {estimated} estimated"));
    }
    lines.join("\n")
}

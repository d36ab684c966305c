//! Batch-structured dependency graphs (`.shiki/dag/*.json`).
//!
//! Only `depends_on` and `blocks` edges order execution; `suggests` is
//! advisory. An edge `{from, to}` means `from` must finish before `to` starts.
//! Edges that reference unknown node ids are ignored rather than rejected.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dag {
    pub dag_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub nodes: Vec<DagNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub metadata: DagMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    pub node_id: String,
    #[serde(default)]
    pub task_id: String,
    /// Batches execute in ascending order.
    #[serde(default)]
    pub batch: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default = "default_node_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_tokens: Option<u64>,
}

fn default_node_status() -> String {
    "pending".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type", default)]
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    #[default]
    DependsOn,
    Blocks,
    Suggests,
}

impl EdgeKind {
    /// True for edge kinds that constrain execution order.
    pub fn orders(self) -> bool {
        matches!(self, EdgeKind::DependsOn | EdgeKind::Blocks)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagMetadata {
    #[serde(default)]
    pub total_batches: u32,
    #[serde(default)]
    pub current_batch: u32,
}

/// A directed cycle among ordering edges. Names one node on the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cycle detected in DAG involving node '{node}'")]
pub struct CycleError {
    pub node: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Reject graphs whose ordering edges contain a directed cycle.
///
/// Three-colour depth-first search with an explicit stack; stops at the first
/// back edge found.
pub fn validate_acyclic(dag: &Dag) -> Result<(), CycleError> {
    let adjacency = ordering_adjacency(dag);
    let mut marks: HashMap<&str, Mark> = adjacency
        .keys()
        .map(|id| (*id, Mark::Unvisited))
        .collect();

    for node in &dag.nodes {
        let start = node.node_id.as_str();
        if marks.get(start) != Some(&Mark::Unvisited) {
            continue;
        }
        marks.insert(start, Mark::InProgress);
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let current = frame.0;
            let neighbors = adjacency.get(current).map_or(&[][..], Vec::as_slice);
            match neighbors.get(frame.1) {
                Some(&next) => {
                    frame.1 += 1;
                    match marks.get(next).copied() {
                        Some(Mark::InProgress) => {
                            return Err(CycleError {
                                node: next.to_string(),
                            });
                        }
                        Some(Mark::Unvisited) => {
                            marks.insert(next, Mark::InProgress);
                            stack.push((next, 0));
                        }
                        Some(Mark::Done) | None => {}
                    }
                }
                None => {
                    marks.insert(current, Mark::Done);
                    stack.pop();
                }
            }
        }
    }

    Ok(())
}

/// Partition nodes by batch number, ascending.
///
/// No ordering check against dependency depth happens here; see
/// [`batch_order_warnings`].
pub fn batches(dag: &Dag) -> BTreeMap<u32, Vec<&DagNode>> {
    let mut grouped: BTreeMap<u32, Vec<&DagNode>> = BTreeMap::new();
    for node in &dag.nodes {
        grouped.entry(node.batch).or_default().push(node);
    }
    grouped
}

/// An ordering edge whose dependent node is not scheduled in a later batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOrderWarning {
    pub from: String,
    pub from_batch: u32,
    pub to: String,
    pub to_batch: u32,
}

impl fmt::Display for BatchOrderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node '{}' (batch {}) waits on '{}' (batch {}) but is not scheduled in a later batch",
            self.to, self.to_batch, self.from, self.from_batch
        )
    }
}

/// Flag ordering edges that the batch plan does not honour.
///
/// Batch numbers are planner output and are never rewritten here.
pub fn batch_order_warnings(dag: &Dag) -> Vec<BatchOrderWarning> {
    let batch_of: HashMap<&str, u32> = dag
        .nodes
        .iter()
        .map(|node| (node.node_id.as_str(), node.batch))
        .collect();

    dag.edges
        .iter()
        .filter(|edge| edge.kind.orders())
        .filter_map(|edge| {
            let from_batch = *batch_of.get(edge.from.as_str())?;
            let to_batch = *batch_of.get(edge.to.as_str())?;
            (to_batch <= from_batch).then(|| BatchOrderWarning {
                from: edge.from.clone(),
                from_batch,
                to: edge.to.clone(),
                to_batch,
            })
        })
        .collect()
}

fn ordering_adjacency(dag: &Dag) -> HashMap<&str, Vec<&str>> {
    let mut adjacency: HashMap<&str, Vec<&str>> = dag
        .nodes
        .iter()
        .map(|node| (node.node_id.as_str(), Vec::new()))
        .collect();
    for edge in dag.edges.iter().filter(|edge| edge.kind.orders()) {
        if !adjacency.contains_key(edge.to.as_str()) {
            continue;
        }
        if let Some(targets) = adjacency.get_mut(edge.from.as_str()) {
            targets.push(edge.to.as_str());
        }
    }
    adjacency
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, batch: u32) -> DagNode {
        DagNode {
            node_id: id.to_string(),
            task_id: format!("T-{id}"),
            batch,
            status: default_node_status(),
            ..DagNode::default()
        }
    }

    fn edge(from: &str, to: &str, kind: EdgeKind) -> Edge {
        Edge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        }
    }

    fn dag(nodes: Vec<DagNode>, edges: Vec<Edge>) -> Dag {
        Dag {
            dag_id: "DAG-1".to_string(),
            nodes,
            edges,
            ..Dag::default()
        }
    }

    #[test]
    fn three_node_cycle_names_a_cycle_member() {
        let graph = dag(
            vec![node("A", 0), node("B", 1), node("C", 2)],
            vec![
                edge("A", "B", EdgeKind::DependsOn),
                edge("B", "C", EdgeKind::DependsOn),
                edge("C", "A", EdgeKind::DependsOn),
            ],
        );
        let err = validate_acyclic(&graph).expect_err("cycle");
        assert!(["A", "B", "C"].contains(&err.node.as_str()));
    }

    #[test]
    fn reported_node_is_on_the_cycle_not_the_entry_point() {
        let graph = dag(
            vec![node("X", 0), node("A", 1), node("B", 2)],
            vec![
                edge("X", "A", EdgeKind::DependsOn),
                edge("A", "B", EdgeKind::Blocks),
                edge("B", "A", EdgeKind::DependsOn),
            ],
        );
        let err = validate_acyclic(&graph).expect_err("cycle");
        assert!(["A", "B"].contains(&err.node.as_str()), "got {}", err.node);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let graph = dag(vec![node("A", 0)], vec![edge("A", "A", EdgeKind::Blocks)]);
        assert_eq!(
            validate_acyclic(&graph),
            Err(CycleError {
                node: "A".to_string()
            })
        );
    }

    #[test]
    fn diamond_is_acyclic() {
        let graph = dag(
            vec![node("A", 0), node("B", 1), node("C", 1), node("D", 2)],
            vec![
                edge("A", "B", EdgeKind::DependsOn),
                edge("A", "C", EdgeKind::DependsOn),
                edge("B", "D", EdgeKind::DependsOn),
                edge("C", "D", EdgeKind::Blocks),
            ],
        );
        assert_eq!(validate_acyclic(&graph), Ok(()));
    }

    #[test]
    fn suggests_edges_do_not_form_cycles() {
        let graph = dag(
            vec![node("A", 0), node("B", 1)],
            vec![
                edge("A", "B", EdgeKind::DependsOn),
                edge("B", "A", EdgeKind::Suggests),
            ],
        );
        assert_eq!(validate_acyclic(&graph), Ok(()));
    }

    #[test]
    fn edges_to_unknown_nodes_are_ignored() {
        let graph = dag(
            vec![node("A", 0)],
            vec![
                edge("A", "ghost", EdgeKind::DependsOn),
                edge("ghost", "A", EdgeKind::DependsOn),
            ],
        );
        assert_eq!(validate_acyclic(&graph), Ok(()));
    }

    #[test]
    fn batches_group_in_ascending_order() {
        let graph = dag(vec![node("C", 2), node("A", 0), node("B", 0)], Vec::new());
        let grouped = batches(&graph);
        let layout: Vec<(u32, Vec<&str>)> = grouped
            .iter()
            .map(|(batch, nodes)| {
                (
                    *batch,
                    nodes.iter().map(|node| node.node_id.as_str()).collect(),
                )
            })
            .collect();
        assert_eq!(layout, vec![(0, vec!["A", "B"]), (2, vec!["C"])]);
    }

    #[test]
    fn batch_order_gap_is_flagged_not_fixed() {
        let graph = dag(
            vec![node("A", 1), node("B", 1), node("C", 2)],
            vec![
                edge("A", "B", EdgeKind::DependsOn),
                edge("B", "C", EdgeKind::DependsOn),
                edge("C", "A", EdgeKind::Suggests),
            ],
        );
        let warnings = batch_order_warnings(&graph);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].from, "A");
        assert_eq!(warnings[0].to, "B");
        assert_eq!(graph.nodes[1].batch, 1);
    }

    #[test]
    fn parses_dag_record() {
        let raw = r#"{
            "dag_id": "DAG-7",
            "status": "running",
            "nodes": [
                {"node_id": "n1", "task_id": "T-1", "batch": 0, "engine": "codex", "status": "completed", "actual_tokens": 1200},
                {"node_id": "n2", "task_id": "T-2", "batch": 1}
            ],
            "edges": [{"from": "n1", "to": "n2", "type": "blocks"}],
            "metadata": {"total_batches": 2, "current_batch": 1}
        }"#;
        let graph: Dag = serde_json::from_str(raw).expect("parse");
        assert_eq!(graph.nodes[1].status, "pending");
        assert_eq!(graph.edges[0].kind, EdgeKind::Blocks);
        assert_eq!(graph.metadata.current_batch, 1);
    }
}

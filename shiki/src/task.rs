//! Task records shared by the project store (`.shiki/tasks/`) and the native
//! team store.
//!
//! Unknown fields are kept in [`Task::extra`] so that rewriting a record never
//! drops data owned by another writer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle phase assumed when a task does not declare one.
pub const DEFAULT_PHASE: &str = "execute";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Review,
    Completed,
    Blocked,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Failed => "failed",
        }
    }

    /// True for statuses that still need work (or a decision) from someone.
    pub fn is_active(self) -> bool {
        !matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution engine a task can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Engine {
    /// Deliberation-favoring engine (planning, review, cross-cutting work).
    ClaudeTeam,
    /// Sandboxed, execution-favoring engine.
    Codex,
    Human,
}

impl Engine {
    pub fn as_str(self) -> &'static str {
        match self {
            Engine::ClaudeTeam => "claude-team",
            Engine::Codex => "codex",
            Engine::Human => "human",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a task's `assigned_to` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Assignee {
    #[serde(alias = "claude-leader", alias = "claude-member")]
    ClaudeTeam,
    Codex,
    Human,
    #[default]
    Unassigned,
}

impl Assignee {
    pub fn as_str(self) -> &'static str {
        match self {
            Assignee::ClaudeTeam => "claude-team",
            Assignee::Codex => "codex",
            Assignee::Human => "human",
            Assignee::Unassigned => "unassigned",
        }
    }

    pub fn engine(self) -> Option<Engine> {
        match self {
            Assignee::ClaudeTeam => Some(Engine::ClaudeTeam),
            Assignee::Codex => Some(Engine::Codex),
            Assignee::Human => Some(Engine::Human),
            Assignee::Unassigned => None,
        }
    }
}

impl From<Engine> for Assignee {
    fn from(engine: Engine) -> Self {
        match engine {
            Engine::ClaudeTeam => Assignee::ClaudeTeam,
            Engine::Codex => Assignee::Codex,
            Engine::Human => Assignee::Human,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityLayer {
    Coordinator,
    #[default]
    Executor,
    Monitor,
}

impl AuthorityLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityLayer::Coordinator => "coordinator",
            AuthorityLayer::Executor => "executor",
            AuthorityLayer::Monitor => "monitor",
        }
    }
}

/// Token budget attached to a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default)]
    pub estimated_tokens: u64,
    #[serde(default)]
    pub actual_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

/// Routing hints attached by whoever planned the task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_ref: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Routing decision persisted on a task by `shiki route`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineRecord {
    Routed {
        primary: Engine,
        fallback: Engine,
        routing_reason: String,
    },
    /// Older records carry a bare engine name.
    Named(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Empty when the record omits it; loaders fill it from the file stem.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Assignee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_layer: Option<AuthorityLayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta_phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<TaskContext>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == Some(TaskStatus::Pending)
    }

    /// Lowercased `title + " " + description`, the haystack for keyword rules.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.description).to_lowercase()
    }

    pub fn phase(&self) -> &str {
        self.theta_phase.as_deref().unwrap_or(DEFAULT_PHASE)
    }

    pub fn authority(&self) -> AuthorityLayer {
        self.authority_layer.unwrap_or_default()
    }

    pub fn target_file_count(&self) -> usize {
        self.context
            .as_ref()
            .map_or(0, |context| context.target_files.len())
    }

    pub fn has_contract_ref(&self) -> bool {
        self.context
            .as_ref()
            .and_then(|context| context.contract_ref.as_deref())
            .is_some_and(|contract| !contract.trim().is_empty())
    }

    pub fn actual_tokens(&self) -> u64 {
        self.budget.as_ref().map_or(0, |budget| budget.actual_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_claude_assignees_read_as_team() {
        let task: Task =
            serde_json::from_str(r#"{"id":"T-1","assigned_to":"claude-leader"}"#).expect("parse");
        assert_eq!(task.assigned_to, Some(Assignee::ClaudeTeam));
    }

    #[test]
    fn unknown_fields_survive_a_rewrite() {
        let raw = r#"{"id":"T-2","status":"in_progress","notes":"keep me","context":{"target_files":["a.rs"],"owner":"x"}}"#;
        let task: Task = serde_json::from_str(raw).expect("parse");
        assert_eq!(task.status, Some(TaskStatus::InProgress));
        assert_eq!(task.target_file_count(), 1);

        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(value["notes"], "keep me");
        assert_eq!(value["context"]["owner"], "x");
    }

    #[test]
    fn engine_record_accepts_bare_names() {
        let task: Task = serde_json::from_str(r#"{"id":"T-3","engine":"codex"}"#).expect("parse");
        assert_eq!(task.engine, Some(EngineRecord::Named("codex".to_string())));
    }

    #[test]
    fn defaults_for_routing_inputs() {
        let task = Task::new("T-4", "write docs");
        assert_eq!(task.phase(), "execute");
        assert_eq!(task.authority(), AuthorityLayer::Executor);
        assert_eq!(task.target_file_count(), 0);
        assert!(!task.has_contract_ref());
        assert!(!task.is_pending());
    }
}

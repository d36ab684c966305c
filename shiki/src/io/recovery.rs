//! Recovery brief for resuming an interrupted session.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::recovery::categorize;
use crate::io::session::SessionSnapshot;
use crate::task::Task;

const RECOVERY_TEMPLATE: &str = include_str!("prompts/recovery.md");

#[derive(Debug, Serialize)]
struct TaskLine {
    id: String,
    title: String,
    status: String,
    assigned_to: String,
    claimed_by: Option<String>,
    depends_on: Vec<String>,
}

impl TaskLine {
    fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status.map_or("pending", |status| status.as_str()).to_string(),
            assigned_to: task
                .assigned_to
                .map_or("unassigned", |who| who.as_str())
                .to_string(),
            claimed_by: task.claimed_by.clone(),
            depends_on: task.depends_on.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TaskGroup {
    title: &'static str,
    tasks: Vec<TaskLine>,
}

#[derive(Debug, Serialize)]
struct TokenTotals {
    actual: u64,
    estimated: u64,
    session_limit: Option<u64>,
}

/// Everything the brief is rendered from.
pub struct RecoveryInputs<'a> {
    pub snapshot: &'a SessionSnapshot,
    /// Current project store contents, not the snapshot's copy.
    pub tasks: &'a [Task],
    pub team_name: &'a str,
    pub session_limit: Option<u64>,
}

fn group(title: &'static str, tasks: &[&Task]) -> TaskGroup {
    TaskGroup {
        title,
        tasks: tasks.iter().map(|task| TaskLine::from_task(task)).collect(),
    }
}

pub fn render_recovery_brief(inputs: &RecoveryInputs<'_>) -> Result<String> {
    let buckets = categorize(inputs.tasks);
    let groups = vec![
        group("In progress (resume first)", &buckets.in_progress),
        group("Blocked (resolve the blocker)", &buckets.blocked),
        group("Pending", &buckets.pending),
        group("Awaiting review", &buckets.review),
    ];
    let tokens = TokenTotals {
        actual: inputs.tasks.iter().map(Task::actual_tokens).sum(),
        estimated: inputs
            .tasks
            .iter()
            .filter_map(|task| task.budget.as_ref())
            .map(|budget| budget.estimated_tokens)
            .sum(),
        session_limit: inputs.session_limit,
    };

    let mut env = Environment::new();
    env.add_template("recovery", RECOVERY_TEMPLATE)?;
    let rendered = env.get_template("recovery")?.render(context! {
        session => inputs.snapshot,
        team_name => inputs.team_name,
        git => inputs.snapshot.git_state.as_ref(),
        groups => groups,
        open => buckets.open_count(),
        completed => buckets.completed,
        failed => buckets.failed,
        tokens => tokens,
        notes => inputs.snapshot.notes.as_deref().map(str::trim).filter(|notes| !notes.is_empty()),
    })?;
    Ok(rendered)
}

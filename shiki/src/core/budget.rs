//! Token budget checks across the project's tasks.

use std::fmt;

use crate::task::Task;

/// Limits from config; `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetLimits {
    pub per_task: Option<u64>,
    pub per_session: Option<u64>,
}

impl BudgetLimits {
    /// Build limits from raw config values where `0` disables a limit.
    pub fn from_config(max_tokens_per_task: u64, max_tokens_per_session: u64) -> Self {
        Self {
            per_task: (max_tokens_per_task > 0).then_some(max_tokens_per_task),
            per_session: (max_tokens_per_session > 0).then_some(max_tokens_per_session),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetViolation {
    Task { id: String, actual: u64, max: u64 },
    Session { total: u64, max: u64 },
}

impl fmt::Display for BudgetViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetViolation::Task { id, actual, max } => {
                write!(f, "task {id}: actual_tokens ({actual}) exceeds max ({max})")
            }
            BudgetViolation::Session { total, max } => {
                write!(f, "total token usage ({total}) exceeds session limit ({max})")
            }
        }
    }
}

/// Report tasks over their own (or the default) limit, then the session total.
///
/// A task-level `budget.max_tokens` takes precedence over the per-task default.
pub fn check_budgets(tasks: &[Task], limits: BudgetLimits) -> Vec<BudgetViolation> {
    let mut violations = Vec::new();
    let mut total: u64 = 0;

    for task in tasks {
        let actual = task.actual_tokens();
        let max = task
            .budget
            .as_ref()
            .and_then(|budget| budget.max_tokens)
            .filter(|max| *max > 0)
            .or(limits.per_task);
        if let Some(max) = max
            && actual > max
        {
            violations.push(BudgetViolation::Task {
                id: task.id.clone(),
                actual,
                max,
            });
        }
        total = total.saturating_add(actual);
    }

    if let Some(max) = limits.per_session
        && total > max
    {
        violations.push(BudgetViolation::Session { total, max });
    }

    violations
}

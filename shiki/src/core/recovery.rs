//! Task grouping for session recovery briefs.

use crate::task::{Task, TaskStatus};

/// Tasks grouped by what a resumed session should do with them.
///
/// Finished tasks are only counted. A task without a status is treated as
/// pending.
#[derive(Debug, Default)]
pub struct TaskBuckets<'a> {
    pub in_progress: Vec<&'a Task>,
    pub blocked: Vec<&'a Task>,
    pub pending: Vec<&'a Task>,
    pub review: Vec<&'a Task>,
    pub completed: usize,
    pub failed: usize,
}

impl TaskBuckets<'_> {
    /// Tasks that still need someone to act on them.
    pub fn open_count(&self) -> usize {
        self.in_progress.len() + self.blocked.len() + self.pending.len() + self.review.len()
    }
}

pub fn categorize(tasks: &[Task]) -> TaskBuckets<'_> {
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by(|left, right| left.id.cmp(&right.id));

    let mut buckets = TaskBuckets::default();
    for task in sorted {
        match task.status.unwrap_or(TaskStatus::Pending) {
            TaskStatus::InProgress => buckets.in_progress.push(task),
            TaskStatus::Blocked => buckets.blocked.push(task),
            TaskStatus::Pending => buckets.pending.push(task),
            TaskStatus::Review => buckets.review.push(task),
            TaskStatus::Completed => buckets.completed += 1,
            TaskStatus::Failed => buckets.failed += 1,
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, status: Option<TaskStatus>) -> Task {
        Task {
            status,
            ..Task::new(id, id)
        }
    }

    #[test]
    fn groups_open_work_and_counts_finished() {
        let tasks = vec![
            task("T-3", Some(TaskStatus::InProgress)),
            task("T-1", Some(TaskStatus::InProgress)),
            task("T-2", None),
            task("T-4", Some(TaskStatus::Completed)),
            task("T-5", Some(TaskStatus::Failed)),
            task("T-6", Some(TaskStatus::Review)),
        ];
        let buckets = categorize(&tasks);
        let ids: Vec<&str> = buckets
            .in_progress
            .iter()
            .map(|task| task.id.as_str())
            .collect();
        assert_eq!(ids, vec!["T-1", "T-3"]);
        assert_eq!(buckets.pending.len(), 1);
        assert_eq!(buckets.review.len(), 1);
        assert_eq!((buckets.completed, buckets.failed), (1, 1));
        assert_eq!(buckets.open_count(), 4);
    }
}

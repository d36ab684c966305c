//! Reconciliation between the native team store and the project store.
//!
//! Neither store is authoritative. [`compare`] reports divergence and
//! [`propagate`] copies tracked fields one way; a source field that is absent
//! never erases a destination value.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::task::{Task, TaskStatus};

/// Task fields that reconciliation compares and copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackedField {
    Status,
    AssignedTo,
    ClaimedBy,
    Priority,
}

impl TrackedField {
    /// Fields copied by [`propagate`].
    pub const ALL: [TrackedField; 4] = [
        TrackedField::Status,
        TrackedField::AssignedTo,
        TrackedField::ClaimedBy,
        TrackedField::Priority,
    ];

    /// Fields checked for a field mismatch once statuses agree.
    pub const COMPARED: [TrackedField; 3] = [
        TrackedField::AssignedTo,
        TrackedField::ClaimedBy,
        TrackedField::Priority,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrackedField::Status => "status",
            TrackedField::AssignedTo => "assigned_to",
            TrackedField::ClaimedBy => "claimed_by",
            TrackedField::Priority => "priority",
        }
    }

    pub fn value(self, task: &Task) -> Option<String> {
        match self {
            TrackedField::Status => task.status.map(|status| status.as_str().to_string()),
            TrackedField::AssignedTo => task.assigned_to.map(|who| who.as_str().to_string()),
            TrackedField::ClaimedBy => task.claimed_by.clone(),
            TrackedField::Priority => task.priority.clone(),
        }
    }

    fn copy(self, from: &Task, to: &mut Task) {
        match self {
            TrackedField::Status => to.status = from.status,
            TrackedField::AssignedTo => to.assigned_to = from.assigned_to,
            TrackedField::ClaimedBy => to.claimed_by.clone_from(&from.claimed_by),
            TrackedField::Priority => to.priority.clone_from(&from.priority),
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of comparing one field across the two stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldComparison {
    BothAbsent,
    /// Present on exactly one side.
    OneSided,
    Equal,
    Different,
}

impl FieldComparison {
    pub fn of(native: Option<&str>, project: Option<&str>) -> Self {
        match (native, project) {
            (None, None) => FieldComparison::BothAbsent,
            (Some(_), None) | (None, Some(_)) => FieldComparison::OneSided,
            (Some(left), Some(right)) if left == right => FieldComparison::Equal,
            (Some(_), Some(_)) => FieldComparison::Different,
        }
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, FieldComparison::OneSided | FieldComparison::Different)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMismatch {
    pub id: String,
    pub native: Option<TaskStatus>,
    pub project: Option<TaskStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: TrackedField,
    pub native: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    pub id: String,
    pub diffs: Vec<FieldDiff>,
}

/// Every task id lands in exactly one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub native_only: Vec<String>,
    pub project_only: Vec<String>,
    pub status_mismatch: Vec<StatusMismatch>,
    pub field_mismatch: Vec<FieldMismatch>,
    pub in_sync: Vec<String>,
}

impl SyncReport {
    pub fn discrepancies(&self) -> usize {
        self.native_only.len()
            + self.project_only.len()
            + self.status_mismatch.len()
            + self.field_mismatch.len()
    }
}

/// Compare the two stores keyed by task id.
///
/// Other fields are only compared when statuses agree, so a task appears in at
/// most one mismatch partition.
pub fn compare(native: &BTreeMap<String, Task>, project: &BTreeMap<String, Task>) -> SyncReport {
    let ids: BTreeSet<&String> = native.keys().chain(project.keys()).collect();
    let mut report = SyncReport::default();

    for id in ids {
        let (left, right) = match (native.get(id), project.get(id)) {
            (Some(left), Some(right)) => (left, right),
            (Some(_), None) => {
                report.native_only.push(id.clone());
                continue;
            }
            (None, Some(_)) => {
                report.project_only.push(id.clone());
                continue;
            }
            (None, None) => continue,
        };

        if left.status != right.status {
            report.status_mismatch.push(StatusMismatch {
                id: id.clone(),
                native: left.status,
                project: right.status,
            });
            continue;
        }

        let diffs: Vec<FieldDiff> = TrackedField::COMPARED
            .iter()
            .filter_map(|field| {
                let native_value = field.value(left);
                let project_value = field.value(right);
                FieldComparison::of(native_value.as_deref(), project_value.as_deref())
                    .is_mismatch()
                    .then(|| FieldDiff {
                        field: *field,
                        native: native_value,
                        project: project_value,
                    })
            })
            .collect();

        if diffs.is_empty() {
            report.in_sync.push(id.clone());
        } else {
            report.field_mismatch.push(FieldMismatch {
                id: id.clone(),
                diffs,
            });
        }
    }

    report
}

/// Stamp values for records written by [`propagate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagateOptions {
    /// RFC 3339 timestamp written to `updated_at`.
    pub now: String,
    /// `mode_origin` for newly created records that lack one.
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated(Vec<TrackedField>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskChange {
    pub id: String,
    pub kind: ChangeKind,
}

/// Copy tracked fields from `source` into `dest`.
///
/// A source value that is present and differs overwrites the destination.
/// Records missing from `dest` are created with `status` defaulting to
/// `pending`. Running it again without external writes yields no changes.
pub fn propagate(
    source: &BTreeMap<String, Task>,
    dest: &mut BTreeMap<String, Task>,
    options: &PropagateOptions,
) -> Vec<TaskChange> {
    let mut changes = Vec::new();

    for (id, incoming) in source {
        match dest.get_mut(id) {
            Some(existing) => {
                let updated: Vec<TrackedField> = TrackedField::ALL
                    .iter()
                    .copied()
                    .filter(|field| {
                        let value = field.value(incoming);
                        value.is_some() && value != field.value(&*existing)
                    })
                    .collect();
                if updated.is_empty() {
                    continue;
                }
                for field in &updated {
                    field.copy(incoming, existing);
                }
                existing.updated_at = Some(options.now.clone());
                changes.push(TaskChange {
                    id: id.clone(),
                    kind: ChangeKind::Updated(updated),
                });
            }
            None => {
                let mut created = incoming.clone();
                created.id.clone_from(id);
                if created.status.is_none() {
                    created.status = Some(TaskStatus::Pending);
                }
                if created.mode_origin.is_none() {
                    created.mode_origin = Some(options.origin.clone());
                }
                created.updated_at = Some(options.now.clone());
                dest.insert(id.clone(), created);
                changes.push(TaskChange {
                    id: id.clone(),
                    kind: ChangeKind::Created,
                });
            }
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Assignee;

    fn store(tasks: Vec<Task>) -> BTreeMap<String, Task> {
        tasks
            .into_iter()
            .map(|task| (task.id.clone(), task))
            .collect()
    }

    fn task(id: &str, status: Option<TaskStatus>) -> Task {
        Task {
            status,
            ..Task::new(id, format!("{id} title"))
        }
    }

    fn options() -> PropagateOptions {
        PropagateOptions {
            now: "2026-01-01T00:00:00+00:00".to_string(),
            origin: "cli".to_string(),
        }
    }

    #[test]
    fn compare_partitions_every_id_once() {
        let mut claimed = task("T-4", Some(TaskStatus::Pending));
        claimed.claimed_by = Some("agent-1".to_string());

        let native = store(vec![
            task("T-1", Some(TaskStatus::Completed)),
            task("T-2", Some(TaskStatus::InProgress)),
            claimed,
            task("T-5", Some(TaskStatus::Review)),
        ]);
        let project = store(vec![
            task("T-2", Some(TaskStatus::Pending)),
            task("T-3", Some(TaskStatus::Pending)),
            task("T-4", Some(TaskStatus::Pending)),
            task("T-5", Some(TaskStatus::Review)),
        ]);

        let report = compare(&native, &project);
        assert_eq!(report.native_only, vec!["T-1"]);
        assert_eq!(report.project_only, vec!["T-3"]);
        assert_eq!(report.status_mismatch.len(), 1);
        assert_eq!(report.status_mismatch[0].id, "T-2");
        assert_eq!(report.field_mismatch.len(), 1);
        assert_eq!(
            report.field_mismatch[0].diffs,
            vec![FieldDiff {
                field: TrackedField::ClaimedBy,
                native: Some("agent-1".to_string()),
                project: None,
            }]
        );
        assert_eq!(report.in_sync, vec!["T-5"]);
        assert_eq!(report.discrepancies(), 4);
    }

    #[test]
    fn both_absent_is_not_a_mismatch() {
        assert_eq!(FieldComparison::of(None, None), FieldComparison::BothAbsent);
        assert!(!FieldComparison::of(None, None).is_mismatch());
        assert!(FieldComparison::of(Some("a"), None).is_mismatch());
        assert!(!FieldComparison::of(Some("a"), Some("a")).is_mismatch());
    }

    #[test]
    fn propagate_overwrites_only_present_values() {
        let mut incoming = task("T-1", Some(TaskStatus::Completed));
        incoming.assigned_to = Some(Assignee::Codex);
        let source = store(vec![incoming]);

        let mut existing = task("T-1", Some(TaskStatus::InProgress));
        existing.priority = Some("high".to_string());
        let mut dest = store(vec![existing]);

        let changes = propagate(&source, &mut dest, &options());
        assert_eq!(
            changes,
            vec![TaskChange {
                id: "T-1".to_string(),
                kind: ChangeKind::Updated(vec![TrackedField::Status, TrackedField::AssignedTo]),
            }]
        );
        let merged = &dest["T-1"];
        assert_eq!(merged.status, Some(TaskStatus::Completed));
        assert_eq!(merged.priority.as_deref(), Some("high"));
        assert_eq!(merged.updated_at.as_deref(), Some(options().now.as_str()));
    }

    #[test]
    fn propagate_creates_missing_records_with_defaults() {
        let source = store(vec![task("T-9", None)]);
        let mut dest = BTreeMap::new();

        let changes = propagate(&source, &mut dest, &options());
        assert_eq!(changes[0].kind, ChangeKind::Created);
        let created = &dest["T-9"];
        assert_eq!(created.status, Some(TaskStatus::Pending));
        assert_eq!(created.mode_origin.as_deref(), Some("cli"));
    }

    #[test]
    fn propagate_is_idempotent_in_both_directions() {
        let mut native_task = task("T-1", Some(TaskStatus::Completed));
        native_task.claimed_by = Some("agent-2".to_string());
        let mut native = store(vec![native_task, task("T-2", None)]);

        let mut project_task = task("T-1", Some(TaskStatus::Pending));
        project_task.priority = Some("low".to_string());
        let mut project = store(vec![project_task, task("T-3", Some(TaskStatus::Blocked))]);

        propagate(&native, &mut project, &options());
        propagate(&project, &mut native, &options());

        assert!(propagate(&native, &mut project, &options()).is_empty());
        assert!(propagate(&project, &mut native, &options()).is_empty());
        assert_eq!(compare(&native, &project).discrepancies(), 0);
    }
}

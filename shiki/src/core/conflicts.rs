//! Cross-branch file overlap detection and worktree naming rules.
//!
//! Overlap of changed paths is a cheap pre-check. It is neither sound nor
//! complete: two branches touching the same file may merge cleanly, and
//! branches with disjoint paths can still break each other semantically. A
//! real merge attempt remains the ground truth.

use std::collections::BTreeSet;

/// Branch prefix used for task worktrees (`shiki/task-<id>`).
pub const TASK_BRANCH_PREFIX: &str = "shiki/task-";

/// Directory name of a branch's worktree under the base dir.
pub fn branch_dir_name(branch: &str) -> String {
    branch.replace('/', "_")
}

/// Task id implied by a `shiki/task-<id>` branch name.
pub fn task_id_from_branch(branch: &str) -> Option<&str> {
    branch
        .strip_prefix(TASK_BRANCH_PREFIX)
        .filter(|id| !id.is_empty())
}

/// Files changed on one branch relative to the common base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchChanges {
    pub branch: String,
    pub files: BTreeSet<String>,
}

/// Files changed on both branches of a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    pub left: String,
    pub right: String,
    pub files: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    pub base: String,
    /// True when no common ancestor was found and `HEAD` was used instead.
    pub degraded_base: bool,
    /// Branches that could not be resolved.
    pub skipped: Vec<String>,
    pub changes: Vec<BranchChanges>,
    pub overlaps: Vec<Overlap>,
}

impl ConflictReport {
    pub fn has_conflicts(&self) -> bool {
        !self.overlaps.is_empty()
    }
}

/// Intersect every unordered pair of branches once, in input order.
pub fn pairwise_overlaps(changes: &[BranchChanges]) -> Vec<Overlap> {
    let mut overlaps = Vec::new();
    for (index, left) in changes.iter().enumerate() {
        for right in &changes[index + 1..] {
            if left.branch == right.branch {
                continue;
            }
            let files: BTreeSet<String> = left.files.intersection(&right.files).cloned().collect();
            if !files.is_empty() {
                overlaps.push(Overlap {
                    left: left.branch.clone(),
                    right: right.branch.clone(),
                    files,
                });
            }
        }
    }
    overlaps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes(branch: &str, files: &[&str]) -> BranchChanges {
        BranchChanges {
            branch: branch.to_string(),
            files: files.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn disjoint_branches_do_not_overlap() {
        let overlaps = pairwise_overlaps(&[changes("a", &["x.rs"]), changes("b", &["y.rs"])]);
        assert!(overlaps.is_empty());
    }

    #[test]
    fn shared_files_are_reported_per_pair() {
        let overlaps = pairwise_overlaps(&[
            changes("a", &["x.rs", "shared.rs"]),
            changes("b", &["shared.rs"]),
            changes("c", &["x.rs", "shared.rs"]),
        ]);
        let pairs: Vec<(&str, &str, usize)> = overlaps
            .iter()
            .map(|overlap| (overlap.left.as_str(), overlap.right.as_str(), overlap.files.len()))
            .collect();
        assert_eq!(pairs, vec![("a", "b", 1), ("a", "c", 2), ("b", "c", 1)]);
    }

    #[test]
    fn repeated_branch_is_not_paired_with_itself() {
        let overlaps = pairwise_overlaps(&[changes("a", &["x.rs"]), changes("a", &["x.rs"])]);
        assert!(overlaps.is_empty());
    }

    #[test]
    fn branch_naming_rules() {
        assert_eq!(branch_dir_name("shiki/task-T-1"), "shiki_task-T-1");
        assert_eq!(task_id_from_branch("shiki/task-T-0001"), Some("T-0001"));
        assert_eq!(task_id_from_branch("shiki/task-"), None);
        assert_eq!(task_id_from_branch("feature/login"), None);
    }
}

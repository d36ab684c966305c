//! Engine routing: pick the engine a task should run on.
//!
//! The decision is a fixed precedence chain; the last step is a weighted
//! keyword/feature score whose tables live in [`AffinityRules`] so they can be
//! overridden from config and tested without touching the filesystem.
//!
//! Precedence (first match wins):
//! 1. codex unavailable (unless pinned to claude-only)
//! 2. pinned strategy
//! 3. phase default
//! 4. explicit assignment
//! 5. affinity score, ties go to codex

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::task::{Assignee, Engine, EngineRecord, Task};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    #[default]
    Affinity,
    ClaudeOnly,
    CodexOnly,
}

impl RoutingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutingStrategy::Affinity => "affinity",
            RoutingStrategy::ClaudeOnly => "claude-only",
            RoutingStrategy::CodexOnly => "codex-only",
        }
    }
}

/// Engine preferred for a lifecycle phase; `auto` defers to later rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseDefault {
    Claude,
    Codex,
    Auto,
}

impl PhaseDefault {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseDefault::Claude => "claude",
            PhaseDefault::Codex => "codex",
            PhaseDefault::Auto => "auto",
        }
    }
}

pub fn default_phase_defaults() -> BTreeMap<String, PhaseDefault> {
    [
        ("understand", PhaseDefault::Claude),
        ("generate", PhaseDefault::Claude),
        ("allocate", PhaseDefault::Claude),
        ("execute", PhaseDefault::Auto),
        ("verify", PhaseDefault::Claude),
        ("integrate", PhaseDefault::Claude),
    ]
    .into_iter()
    .map(|(phase, default)| (phase.to_string(), default))
    .collect()
}

/// Weighted rule tables for the affinity score.
///
/// Keywords match as lowercase substrings of `title + " " + description`, so
/// short keys like `ci` also hit inside longer words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinityRules {
    /// At or above this many target files, claude gets `multi_file_bonus`.
    pub multi_file_threshold: usize,
    pub multi_file_bonus: u32,
    /// Awarded to codex for zero or one target file.
    pub single_file_bonus: u32,
    pub contract_ref_bonus: u32,
    /// At or above this many acceptance criteria, codex gets `acceptance_bonus`.
    pub acceptance_threshold: usize,
    pub acceptance_bonus: u32,
    /// Awarded to claude for every phase other than `execute`.
    pub non_execute_phase_bonus: u32,
    pub claude_keywords: BTreeMap<String, u32>,
    pub codex_keywords: BTreeMap<String, u32>,
    pub claude_authority_bonus: BTreeMap<String, u32>,
    pub codex_authority_bonus: BTreeMap<String, u32>,
}

fn table(entries: &[(&str, u32)]) -> BTreeMap<String, u32> {
    entries
        .iter()
        .map(|(key, weight)| ((*key).to_string(), *weight))
        .collect()
}

impl Default for AffinityRules {
    fn default() -> Self {
        Self {
            claude_keywords: table(&[
                ("refactor", 3),
                ("redesign", 3),
                ("architect", 3),
                ("design", 2),
                ("review", 3),
                ("debug", 2),
                ("investigate", 2),
                ("analyze", 2),
                ("plan", 3),
                ("migrate", 2),
                ("security", 2),
                ("vulnerability", 2),
                ("multi-file", 2),
                ("cross-cutting", 2),
                ("integration", 2),
                ("coordinate", 2),
            ]),
            codex_keywords: table(&[
                ("implement", 2),
                ("create", 1),
                ("add", 1),
                ("test", 3),
                ("fix", 1),
                ("bugfix", 2),
                ("ci", 2),
                ("lint", 2),
                ("format", 2),
                ("boilerplate", 3),
                ("scaffold", 2),
                ("generate", 1),
                ("docs", 2),
                ("documentation", 2),
                ("typing", 2),
                ("types", 1),
            ]),
            multi_file_threshold: 3,
            multi_file_bonus: 3,
            single_file_bonus: 2,
            claude_authority_bonus: table(&[("coordinator", 3), ("monitor", 2)]),
            codex_authority_bonus: table(&[("executor", 1)]),
            contract_ref_bonus: 2,
            acceptance_threshold: 2,
            acceptance_bonus: 1,
            non_execute_phase_bonus: 5,
        }
    }
}

/// Everything `route` needs besides the task itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPolicy {
    pub strategy: RoutingStrategy,
    pub codex_available: bool,
    pub phase_defaults: BTreeMap<String, PhaseDefault>,
    pub rules: AffinityRules,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::Affinity,
            codex_available: true,
            phase_defaults: default_phase_defaults(),
            rules: AffinityRules::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub primary: Engine,
    pub fallback: Engine,
    pub reason: String,
}

impl RouteDecision {
    fn new(primary: Engine, fallback: Engine, reason: impl Into<String>) -> Self {
        Self {
            primary,
            fallback,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AffinityScore {
    pub claude: u32,
    pub codex: u32,
}

/// Score a task against the rule tables.
pub fn score(task: &Task, rules: &AffinityRules) -> AffinityScore {
    let text = task.search_text();
    let keyword_total = |keywords: &BTreeMap<String, u32>| -> u32 {
        keywords
            .iter()
            .filter(|(keyword, _)| text.contains(keyword.as_str()))
            .map(|(_, weight)| weight)
            .sum()
    };

    let mut result = AffinityScore {
        claude: keyword_total(&rules.claude_keywords),
        codex: keyword_total(&rules.codex_keywords),
    };

    let files = task.target_file_count();
    if files >= rules.multi_file_threshold {
        result.claude += rules.multi_file_bonus;
    } else if files <= 1 {
        result.codex += rules.single_file_bonus;
    }

    let authority = task.authority().as_str();
    result.claude += rules
        .claude_authority_bonus
        .get(authority)
        .copied()
        .unwrap_or(0);
    result.codex += rules
        .codex_authority_bonus
        .get(authority)
        .copied()
        .unwrap_or(0);

    if task.has_contract_ref() {
        result.codex += rules.contract_ref_bonus;
    }
    if task.acceptance.len() >= rules.acceptance_threshold {
        result.codex += rules.acceptance_bonus;
    }
    if task.phase() != crate::task::DEFAULT_PHASE {
        result.claude += rules.non_execute_phase_bonus;
    }

    result
}

/// Decide primary and fallback engines for a task. Pure and deterministic.
pub fn route(task: &Task, policy: &RoutingPolicy) -> RouteDecision {
    use Engine::{ClaudeTeam, Codex, Human};

    if !policy.codex_available && policy.strategy != RoutingStrategy::ClaudeOnly {
        let reason = match policy.strategy {
            RoutingStrategy::CodexOnly => "engine_unavailable(codex; strategy=codex-only)",
            _ => "engine_unavailable(codex not installed or not authenticated)",
        };
        return RouteDecision::new(ClaudeTeam, ClaudeTeam, reason);
    }

    match policy.strategy {
        RoutingStrategy::ClaudeOnly => {
            return RouteDecision::new(ClaudeTeam, ClaudeTeam, "strategy=claude-only");
        }
        RoutingStrategy::CodexOnly => {
            return RouteDecision::new(Codex, Codex, "strategy=codex-only");
        }
        RoutingStrategy::Affinity => {}
    }

    let phase = task.phase();
    match policy.phase_defaults.get(phase) {
        Some(PhaseDefault::Claude) => {
            return RouteDecision::new(ClaudeTeam, Codex, format!("phase_default({phase}=claude)"));
        }
        Some(PhaseDefault::Codex) => {
            return RouteDecision::new(Codex, ClaudeTeam, format!("phase_default({phase}=codex)"));
        }
        Some(PhaseDefault::Auto) | None => {}
    }

    match task.assigned_to {
        Some(Assignee::ClaudeTeam) => {
            return RouteDecision::new(ClaudeTeam, Codex, "explicit_assignment");
        }
        Some(Assignee::Codex) => return RouteDecision::new(Codex, ClaudeTeam, "explicit_assignment"),
        Some(Assignee::Human) => return RouteDecision::new(Human, Human, "human_task"),
        Some(Assignee::Unassigned) | None => {}
    }

    let AffinityScore { claude, codex } = score(task, &policy.rules);
    if claude > codex {
        RouteDecision::new(
            ClaudeTeam,
            Codex,
            format!("affinity(claude={claude},codex={codex})"),
        )
    } else if codex > claude {
        RouteDecision::new(
            Codex,
            ClaudeTeam,
            format!("affinity(claude={claude},codex={codex})"),
        )
    } else {
        RouteDecision::new(
            Codex,
            ClaudeTeam,
            format!("affinity_tie(claude={claude},codex={codex})->codex(sandbox)"),
        )
    }
}

/// Record a decision on the task. Only `pending` tasks are touched.
///
/// Returns true when the task was modified.
pub fn apply_decision(task: &mut Task, decision: &RouteDecision) -> bool {
    if !task.is_pending() {
        return false;
    }
    task.assigned_to = Some(Assignee::from(decision.primary));
    task.engine = Some(EngineRecord::Routed {
        primary: decision.primary,
        fallback: decision.fallback,
        routing_reason: decision.reason.clone(),
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{AuthorityLayer, TaskContext, TaskStatus};

    fn task(title: &str, description: &str, files: &[&str]) -> Task {
        Task {
            description: description.to_string(),
            status: Some(TaskStatus::Pending),
            authority_layer: Some(AuthorityLayer::Executor),
            theta_phase: Some("execute".to_string()),
            context: Some(TaskContext {
                target_files: files.iter().map(ToString::to_string).collect(),
                ..TaskContext::default()
            }),
            ..Task::new("T-1", title)
        }
    }

    #[test]
    fn single_file_implementation_task_goes_to_codex() {
        let login = task("implement login", "add handler", &["a.py"]);
        assert_eq!(
            score(&login, &AffinityRules::default()),
            AffinityScore {
                claude: 0,
                codex: 6
            }
        );

        let decision = route(&login, &RoutingPolicy::default());
        assert_eq!(decision.primary, Engine::Codex);
        assert_eq!(decision.fallback, Engine::ClaudeTeam);
        assert_eq!(decision.reason, "affinity(claude=0,codex=6)");
    }

    #[test]
    fn multi_file_refactor_goes_to_claude() {
        let refactor = task("refactor auth", "", &["a.rs", "b.rs", "c.rs"]);
        let decision = route(&refactor, &RoutingPolicy::default());
        assert_eq!(decision.primary, Engine::ClaudeTeam);
        assert_eq!(decision.reason, "affinity(claude=6,codex=1)");
    }

    #[test]
    fn tie_prefers_codex() {
        let tied = task("debug and review the test fix", "", &["a.rs", "b.rs"]);
        let decision = route(&tied, &RoutingPolicy::default());
        assert_eq!(decision.primary, Engine::Codex);
        assert!(decision.reason.contains("tie"), "{}", decision.reason);
        assert!(decision.reason.contains("claude=5,codex=5"));
    }

    #[test]
    fn unavailable_codex_forces_claude_even_for_codex_only() {
        let policy = RoutingPolicy {
            strategy: RoutingStrategy::CodexOnly,
            codex_available: false,
            ..RoutingPolicy::default()
        };
        let decision = route(&task("add tests", "", &[]), &policy);
        assert_eq!(decision.primary, Engine::ClaudeTeam);
        assert_eq!(decision.fallback, Engine::ClaudeTeam);
        assert!(decision.reason.starts_with("engine_unavailable"));
    }

    #[test]
    fn pinned_strategies_win_over_phase_and_assignment() {
        let mut pinned = task("plan", "", &[]);
        pinned.theta_phase = Some("verify".to_string());
        pinned.assigned_to = Some(Assignee::Human);

        let claude_only = RoutingPolicy {
            strategy: RoutingStrategy::ClaudeOnly,
            codex_available: false,
            ..RoutingPolicy::default()
        };
        assert_eq!(route(&pinned, &claude_only).reason, "strategy=claude-only");

        let codex_only = RoutingPolicy {
            strategy: RoutingStrategy::CodexOnly,
            ..RoutingPolicy::default()
        };
        assert_eq!(route(&pinned, &codex_only).primary, Engine::Codex);
    }

    #[test]
    fn phase_default_precedes_explicit_assignment() {
        let mut verify = task("add tests", "", &[]);
        verify.theta_phase = Some("verify".to_string());
        verify.assigned_to = Some(Assignee::Codex);
        let decision = route(&verify, &RoutingPolicy::default());
        assert_eq!(decision.primary, Engine::ClaudeTeam);
        assert_eq!(decision.reason, "phase_default(verify=claude)");
    }

    #[test]
    fn explicit_assignment_is_honoured() {
        let mut human = task("implement", "", &[]);
        human.assigned_to = Some(Assignee::Human);
        let decision = route(&human, &RoutingPolicy::default());
        assert_eq!(decision.primary, Engine::Human);
        assert_eq!(decision.reason, "human_task");

        let mut claude = task("implement", "", &[]);
        claude.assigned_to = Some(Assignee::ClaudeTeam);
        assert_eq!(
            route(&claude, &RoutingPolicy::default()).reason,
            "explicit_assignment"
        );
    }

    #[test]
    fn unknown_phase_scores_with_non_execute_bonus() {
        let mut odd = task("write notes", "", &["a.md", "b.md"]);
        odd.theta_phase = Some("reflect".to_string());
        assert_eq!(
            score(&odd, &AffinityRules::default()),
            AffinityScore {
                claude: 5,
                codex: 1
            }
        );
    }

    #[test]
    fn contract_and_acceptance_bonuses_favor_codex() {
        let mut spec = task("wire up", "", &["a.rs", "b.rs"]);
        spec.acceptance = vec!["returns 200".to_string(), "logs request".to_string()];
        if let Some(context) = spec.context.as_mut() {
            context.contract_ref = Some("contracts/api.md".to_string());
        }
        assert_eq!(
            score(&spec, &AffinityRules::default()),
            AffinityScore {
                claude: 0,
                codex: 4
            }
        );
    }

    #[test]
    fn routing_is_deterministic() {
        let subject = task("investigate flaky ci", "and fix", &["a.rs"]);
        let policy = RoutingPolicy::default();
        assert_eq!(route(&subject, &policy), route(&subject, &policy));
    }

    #[test]
    fn only_pending_tasks_are_written_back() {
        let decision = RouteDecision::new(Engine::Codex, Engine::ClaudeTeam, "affinity(claude=0,codex=6)");

        let mut pending = task("implement login", "", &[]);
        assert!(apply_decision(&mut pending, &decision));
        assert_eq!(pending.assigned_to, Some(Assignee::Codex));
        assert!(matches!(
            pending.engine,
            Some(EngineRecord::Routed {
                primary: Engine::Codex,
                ..
            })
        ));

        let mut running = task("implement login", "", &[]);
        running.status = Some(TaskStatus::InProgress);
        let before = running.clone();
        assert!(!apply_decision(&mut running, &decision));
        assert_eq!(running, before);
    }

    #[test]
    fn rules_override_from_partial_toml() {
        let rules: AffinityRules = toml::from_str(
            r#"
multi_file_threshold = 5
[codex_keywords]
wire = 4
"#,
        )
        .expect("parse rules");
        assert_eq!(rules.multi_file_threshold, 5);
        assert_eq!(rules.codex_keywords.get("wire"), Some(&4));
        assert_eq!(rules.claude_keywords, AffinityRules::default().claude_keywords);
    }
}

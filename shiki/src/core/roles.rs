//! Team role suggestions from detected stack signals.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::task::AuthorityLayer;

/// Roles every team gets regardless of stack.
pub const BASE_ROLES: [&str; 6] = [
    "TeamLeader",
    "GoalClarifier",
    "Architect",
    "QA",
    "SecurityReviewer",
    "ReleaseCaptain",
];

/// Which stacks were seen in the project tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackSignals {
    pub node: bool,
    pub python: bool,
    pub infra: bool,
    pub openapi: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestedRole {
    pub role: String,
    pub authority_layer: AuthorityLayer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthoritySummary {
    pub coordinator: Vec<String>,
    pub executor: Vec<String>,
    pub monitor: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSuggestion {
    pub hints: Vec<String>,
    pub suggested_roles: Vec<SuggestedRole>,
    pub authority_summary: AuthoritySummary,
}

/// Authority layer for a role name; unknown roles execute.
pub fn authority_for(role: &str) -> AuthorityLayer {
    match role {
        "TeamLeader" | "GoalClarifier" | "Architect" | "ReleaseCaptain" | "APIDesigner" => {
            AuthorityLayer::Coordinator
        }
        "SecurityReviewer" => AuthorityLayer::Monitor,
        _ => AuthorityLayer::Executor,
    }
}

pub fn suggest(signals: StackSignals) -> RoleSuggestion {
    let mut hints = Vec::new();
    let mut roles: BTreeSet<&str> = BASE_ROLES.into_iter().collect();
    let stacks = [
        (signals.node, "Detected Node/TypeScript", "FrontendDev"),
        (signals.python, "Detected Python", "BackendDev"),
        (signals.infra, "Detected Docker/CI/Infra", "DevOps"),
        (signals.openapi, "Detected OpenAPI", "APIDesigner"),
    ];
    for (seen, hint, role) in stacks {
        if seen {
            hints.push(hint.to_string());
            roles.insert(role);
        }
    }

    let mut summary = AuthoritySummary::default();
    let suggested_roles = roles
        .into_iter()
        .map(|role| {
            let authority_layer = authority_for(role);
            let bucket = match authority_layer {
                AuthorityLayer::Coordinator => &mut summary.coordinator,
                AuthorityLayer::Executor => &mut summary.executor,
                AuthorityLayer::Monitor => &mut summary.monitor,
            };
            bucket.push(role.to_string());
            SuggestedRole {
                role: role.to_string(),
                authority_layer,
            }
        })
        .collect();

    RoleSuggestion {
        hints,
        suggested_roles,
        authority_summary: summary,
    }
}

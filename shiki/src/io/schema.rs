//! JSON Schema checks for `.shiki/` artifacts.

use anyhow::{Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde_json::Value;

const TASK_SCHEMA: &str = include_str!("../../schemas/task.schema.json");
const DAG_SCHEMA: &str = include_str!("../../schemas/dag.schema.json");
const SESSION_SCHEMA: &str = include_str!("../../schemas/session.schema.json");
const CONTRACT_SCHEMA: &str = include_str!("../../schemas/contract.schema.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Task,
    Dag,
    Session,
    Contract,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Task,
        ArtifactKind::Dag,
        ArtifactKind::Session,
        ArtifactKind::Contract,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::Task => "TASK",
            ArtifactKind::Dag => "DAG",
            ArtifactKind::Session => "SESSION",
            ArtifactKind::Contract => "CONTRACT",
        }
    }

    /// Schema text as shipped in the binary; `shiki init` copies it out.
    pub fn schema_source(self) -> &'static str {
        match self {
            ArtifactKind::Task => TASK_SCHEMA,
            ArtifactKind::Dag => DAG_SCHEMA,
            ArtifactKind::Session => SESSION_SCHEMA,
            ArtifactKind::Contract => CONTRACT_SCHEMA,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Task => "task.schema.json",
            ArtifactKind::Dag => "dag.schema.json",
            ArtifactKind::Session => "session.schema.json",
            ArtifactKind::Contract => "contract.schema.json",
        }
    }
}

/// Compiled validators for every artifact kind.
pub struct SchemaSet {
    task: Validator,
    dag: Validator,
    session: Validator,
    contract: Validator,
}

impl SchemaSet {
    pub fn load() -> Result<Self> {
        Ok(Self {
            task: compile(ArtifactKind::Task)?,
            dag: compile(ArtifactKind::Dag)?,
            session: compile(ArtifactKind::Session)?,
            contract: compile(ArtifactKind::Contract)?,
        })
    }

    /// Every violation message; empty when valid.
    pub fn violations(&self, kind: ArtifactKind, value: &Value) -> Vec<String> {
        let validator = match kind {
            ArtifactKind::Task => &self.task,
            ArtifactKind::Dag => &self.dag,
            ArtifactKind::Session => &self.session,
            ArtifactKind::Contract => &self.contract,
        };
        validator
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect()
    }
}

fn compile(kind: ArtifactKind) -> Result<Validator> {
    let schema: Value = serde_json::from_str(kind.schema_source())
        .map_err(|err| anyhow!("parse {} schema: {err}", kind.label()))?;
    validator_for(&schema).map_err(|err| anyhow!("invalid {} schema: {err}", kind.label()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embedded_schemas_compile() {
        SchemaSet::load().expect("schemas");
    }

    #[test]
    fn task_with_unknown_status_is_rejected() {
        let schemas = SchemaSet::load().expect("schemas");
        let ok = json!({"id": "T-1", "title": "t", "status": "pending"});
        assert!(schemas.violations(ArtifactKind::Task, &ok).is_empty());

        let bad = json!({"id": "T-1", "title": "t", "status": "done"});
        let violations = schemas.violations(ArtifactKind::Task, &bad);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("done"), "{violations:?}");
    }

    #[test]
    fn dag_requires_nodes_and_edges() {
        let schemas = SchemaSet::load().expect("schemas");
        let violations = schemas.violations(ArtifactKind::Dag, &json!({"dag_id": "D"}));
        assert!(violations.iter().any(|message| message.contains("nodes")), "{violations:?}");
    }

    #[test]
    fn contract_needs_owner_and_status() {
        let schemas = SchemaSet::load().expect("schemas");
        let ok = json!({"contract_id": "C-1", "status": "draft", "defined_by": "architect"});
        assert!(schemas.violations(ArtifactKind::Contract, &ok).is_empty());

        let violations = schemas.violations(ArtifactKind::Contract, &json!({"contract_id": "C-1"}));
        assert!(
            violations.iter().any(|message| message.contains("defined_by")),
            "{violations:?}"
        );
    }
}

//! Project configuration stored under `.shiki/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::budget::BudgetLimits;
use crate::core::routing::{
    AffinityRules, PhaseDefault, RoutingPolicy, RoutingStrategy, default_phase_defaults,
};
use crate::io::files::write_atomic;

/// Project configuration (TOML).
///
/// Every section is optional; missing fields take the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShikiConfig {
    /// Team/project name used when no session names a team.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub routing: RoutingConfig,
    pub worktree: WorktreeConfig,
    pub budget: BudgetConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoutingConfig {
    pub strategy: RoutingStrategy,
    /// Skips the codex availability probe when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codex_available: Option<bool>,
    pub phase_defaults: BTreeMap<String, PhaseDefault>,
    pub rules: AffinityRules,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::Affinity,
            codex_available: None,
            phase_defaults: default_phase_defaults(),
            rules: AffinityRules::default(),
        }
    }
}

impl RoutingConfig {
    pub fn policy(&self, codex_available: bool) -> RoutingPolicy {
        RoutingPolicy {
            strategy: self.strategy,
            codex_available,
            phase_defaults: self.phase_defaults.clone(),
            rules: self.rules.clone(),
        }
    }
}

/// What `worktree cleanup` does with uncommitted changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalPolicy {
    /// Remove anyway; uncommitted work is lost.
    #[default]
    Force,
    /// Refuse to remove a dirty worktree.
    AbortIfDirty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorktreeConfig {
    /// Relative paths resolve against the repository root.
    pub base_dir: PathBuf,
    pub cleanup_on_merge: bool,
    pub removal: RemovalPolicy,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("../worktrees"),
            cleanup_on_merge: false,
            removal: RemovalPolicy::Force,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BudgetConfig {
    /// `0` disables the limit.
    pub max_tokens_per_task: u64,
    /// `0` disables the limit.
    pub max_tokens_per_session: u64,
}

impl BudgetConfig {
    pub fn limits(&self) -> BudgetLimits {
        BudgetLimits::from_config(self.max_tokens_per_task, self.max_tokens_per_session)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Defaults to `$HOME/.claude/teams`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teams_dir: Option<PathBuf>,
}

impl SyncConfig {
    pub fn resolved_teams_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.teams_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
        Ok(home.join(".claude").join("teams"))
    }
}

impl ShikiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(anyhow!("name must not be empty when set"));
        }
        if self.worktree.base_dir.as_os_str().is_empty() {
            return Err(anyhow!("worktree.base_dir must not be empty"));
        }
        let rules = &self.routing.rules;
        if rules.multi_file_threshold <= 1 {
            return Err(anyhow!(
                "routing.rules.multi_file_threshold must be > 1 (got {})",
                rules.multi_file_threshold
            ));
        }
        if let Some(keyword) = rules
            .claude_keywords
            .keys()
            .chain(rules.codex_keywords.keys())
            .find(|keyword| keyword.trim().is_empty())
        {
            return Err(anyhow!("routing.rules keyword tables contain an empty key {keyword:?}"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ShikiConfig::default()`.
pub fn load_config(path: &Path) -> Result<ShikiConfig> {
    if !path.exists() {
        let cfg = ShikiConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ShikiConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ShikiConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ShikiConfig::default());
        assert_eq!(cfg.worktree.removal, RemovalPolicy::Force);
        assert_eq!(cfg.budget.limits(), BudgetLimits::default());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
name = "demo"

[routing]
strategy = "claude-only"

[routing.phase_defaults]
execute = "codex"

[worktree]
removal = "abort-if-dirty"
cleanup_on_merge = true
"#,
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.name.as_deref(), Some("demo"));
        assert_eq!(cfg.routing.strategy, RoutingStrategy::ClaudeOnly);
        assert_eq!(
            cfg.routing.phase_defaults.get("execute"),
            Some(&PhaseDefault::Codex)
        );
        assert_eq!(cfg.routing.rules, AffinityRules::default());
        assert_eq!(cfg.worktree.removal, RemovalPolicy::AbortIfDirty);
        assert_eq!(cfg.worktree.base_dir, PathBuf::from("../worktrees"));
    }

    #[test]
    fn rejects_unknown_strategy() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[routing]\nstrategy = \"random\"\n").expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = ShikiConfig {
            name: Some("team-a".to_string()),
            ..ShikiConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
    }
}

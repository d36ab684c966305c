//! `shiki detect`: stack hints and suggested team roles as JSON.

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::roles::{RoleSuggestion, suggest};
use crate::io::stack::detect_stack;

pub fn detect_roles(root: &Path) -> Result<RoleSuggestion> {
    Ok(suggest(detect_stack(root)?))
}

/// Pretty JSON for stdout.
pub fn render_json(suggestion: &RoleSuggestion) -> Result<String> {
    serde_json::to_string_pretty(suggestion).context("serialize role suggestion")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn json_lists_roles_with_layers() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("package.json"), "{}").expect("write");

        let suggestion = detect_roles(temp.path()).expect("detect");
        let value: serde_json::Value =
            serde_json::from_str(&render_json(&suggestion).expect("json")).expect("parse");
        assert_eq!(value["hints"][0], "Detected Node/TypeScript");
        let frontend = value["suggested_roles"]
            .as_array()
            .expect("roles")
            .iter()
            .find(|role| role["role"] == "FrontendDev")
            .expect("frontend role");
        assert_eq!(frontend["authority_layer"], "executor");
    }
}

//! Prompt packs — the templates the gateway renders into final prompts.

use crate::ContractError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One versioned prompt template. Placeholders are `{{name}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPack {
    /// Pack identifier, referenced by contracts.
    pub pack_id: String,
    /// Semver of the template text.
    pub version: String,
    /// The template body.
    pub template: String,
}

/// Pack lookup + rendering. Loaded once, shared read-only.
#[derive(Debug, Default)]
pub struct PromptPackStore {
    packs: HashMap<String, PromptPack>,
}

impl PromptPackStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with the built-in packs.
    pub fn with_builtins() -> Self {
        let mut store = Self::new();
        for pack in crate::builtin::builtin_packs() {
            store.insert(pack);
        }
        store
    }

    /// Register a pack, replacing any previous version.
    pub fn insert(&mut self, pack: PromptPack) {
        self.packs.insert(pack.pack_id.clone(), pack);
    }

    /// Look up a pack.
    pub fn get(&self, pack_id: &str) -> Option<&PromptPack> {
        self.packs.get(pack_id)
    }

    /// Render a pack with the given template variables.
    ///
    /// String values substitute verbatim; everything else substitutes as
    /// compact JSON. Placeholders with no matching variable render empty —
    /// packs are shared across call sites that do not all supply every
    /// variable.
    pub fn render(&self, pack_id: &str, variables: &Value) -> Result<String, ContractError> {
        let pack = self
            .packs
            .get(pack_id)
            .ok_or_else(|| ContractError::PackNotFound(pack_id.to_string()))?;
        Ok(substitute(&pack.template, variables))
    }
}

fn substitute(template: &str, variables: &Value) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match variables.get(name) {
                    Some(Value::String(s)) => rendered.push_str(s),
                    Some(other) => {
                        rendered.push_str(&serde_json::to_string(other).unwrap_or_default())
                    }
                    None => {}
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated placeholder: keep the raw text.
                rendered.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

#![deny(missing_docs)]
//! # cortex-contract — prompt contracts and prompt packs
//!
//! A prompt contract is a versioned, schema-validated IPC spec for one kind
//! of LLM call: input schema, output schema, and the boundary (max tokens,
//! temperature, timeout). Contracts are loaded once per executor process,
//! compiled, cached by ID, and shared read-only.
//!
//! A prompt pack is the template the gateway renders with a request's
//! `template_variables` to produce the final prompt string.

pub mod builtin;
pub mod pack;

pub use pack::{PromptPack, PromptPackStore};

use cortex_types::ContractId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Contract errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ContractError {
    /// The requested contract is not loaded.
    #[error("contract not found: {0}")]
    NotFound(ContractId),

    /// The contract document violated the contract meta-schema.
    #[error("invalid contract {id}: {reason}")]
    Invalid {
        /// Offending contract ID (or file name when the ID is unreadable).
        id: String,
        /// What was wrong.
        reason: String,
    },

    /// An input/output schema failed to compile.
    #[error("schema compile failed in {id}: {reason}")]
    SchemaCompile {
        /// Offending contract ID.
        id: String,
        /// Compiler message.
        reason: String,
    },

    /// The requested prompt pack is not loaded.
    #[error("prompt pack not found: {0}")]
    PackNotFound(String),

    /// A contract file could not be read.
    #[error("contract io error: {0}")]
    Io(#[from] std::io::Error),

    /// A contract file did not parse as JSON.
    #[error("contract parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Required boundary limits of one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    /// Maximum output tokens per call.
    pub max_tokens: u64,
    /// Sampling temperature.
    pub temperature: f64,
    /// Provider call timeout. The provider's timeout is authoritative —
    /// there is no cooperative cancellation above it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// A prompt contract as stored on disk (`PRC-<TAG>-<NNN>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContract {
    /// `PRC-<TAG>-<NNN>`.
    pub contract_id: ContractId,
    /// Semver of this contract document.
    pub version: String,
    /// Prompt pack rendered for calls under this contract.
    pub prompt_pack_id: String,
    /// Required limits.
    pub boundary: Boundary,
    /// JSON Schema for `input_context`. None = accept anything.
    #[serde(default)]
    pub input_schema: Option<Value>,
    /// JSON Schema for the model's final output. None = accept anything.
    #[serde(default)]
    pub output_schema: Option<Value>,
    /// Routing tags.
    #[serde(default)]
    pub domain_tags: Vec<String>,
    /// Structured-output spec passed to the provider (unless tools are
    /// present — the two are mutually exclusive).
    #[serde(default)]
    pub structured_output: Option<Value>,
    /// Expected execution tier (`ho1` for executor-dispatched contracts).
    #[serde(default)]
    pub tier: Option<String>,
}

/// A contract with its schemas compiled, shared read-only after load.
pub struct LoadedContract {
    /// The contract document.
    pub spec: PromptContract,
    input_validator: Option<jsonschema::Validator>,
    output_validator: Option<jsonschema::Validator>,
}

impl LoadedContract {
    fn compile(spec: PromptContract) -> Result<Self, ContractError> {
        if !spec.contract_id.as_str().starts_with("PRC-") {
            return Err(ContractError::Invalid {
                id: spec.contract_id.to_string(),
                reason: "contract_id must match PRC-<TAG>-<NNN>".into(),
            });
        }
        let compile = |schema: &Option<Value>| -> Result<Option<jsonschema::Validator>, String> {
            match schema {
                Some(schema) => jsonschema::validator_for(schema)
                    .map(Some)
                    .map_err(|e| e.to_string()),
                None => Ok(None),
            }
        };
        let input_validator = compile(&spec.input_schema).map_err(|reason| {
            ContractError::SchemaCompile {
                id: spec.contract_id.to_string(),
                reason,
            }
        })?;
        let output_validator = compile(&spec.output_schema).map_err(|reason| {
            ContractError::SchemaCompile {
                id: spec.contract_id.to_string(),
                reason,
            }
        })?;
        Ok(Self {
            spec,
            input_validator,
            output_validator,
        })
    }

    fn run_validator(
        validator: &Option<jsonschema::Validator>,
        instance: &Value,
    ) -> Result<(), Vec<String>> {
        let Some(validator) = validator else {
            return Ok(());
        };
        let errors: Vec<String> = validator.iter_errors(instance).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate a work order's `input_context` against the input schema.
    pub fn validate_input(&self, instance: &Value) -> Result<(), Vec<String>> {
        Self::run_validator(&self.input_validator, instance)
    }

    /// Validate the model's final output against the output schema.
    pub fn validate_output(&self, instance: &Value) -> Result<(), Vec<String>> {
        Self::run_validator(&self.output_validator, instance)
    }
}

impl std::fmt::Debug for LoadedContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedContract")
            .field("contract_id", &self.spec.contract_id)
            .field("version", &self.spec.version)
            .finish_non_exhaustive()
    }
}

/// Contract cache, keyed by ID. Owned by the executor; `Arc`-shared.
#[derive(Debug, Default)]
pub struct ContractStore {
    contracts: HashMap<String, Arc<LoadedContract>>,
}

impl ContractStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with the built-in classify/synthesize/consolidate
    /// contracts, so the kernel runs out of the box.
    pub fn with_builtins() -> Self {
        let mut store = Self::new();
        for spec in builtin::builtin_contracts() {
            store
                .insert(spec)
                .expect("built-in contracts always compile");
        }
        store
    }

    /// Compile and cache one contract. Replaces any previous version.
    pub fn insert(&mut self, spec: PromptContract) -> Result<(), ContractError> {
        let loaded = LoadedContract::compile(spec)?;
        self.contracts
            .insert(loaded.spec.contract_id.to_string(), Arc::new(loaded));
        Ok(())
    }

    /// Load every `*.json` contract document in a directory.
    pub async fn load_dir(&mut self, dir: &Path) -> Result<usize, ContractError> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut loaded = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = tokio::fs::read_to_string(&path).await?;
            let spec: PromptContract = serde_json::from_str(&contents)?;
            tracing::debug!(contract = %spec.contract_id, file = %path.display(), "loaded contract");
            self.insert(spec)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Look up a compiled contract.
    pub fn get(&self, id: &ContractId) -> Option<Arc<LoadedContract>> {
        self.contracts.get(id.as_str()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_contract(id: &str) -> PromptContract {
        PromptContract {
            contract_id: ContractId::new(id),
            version: "1.0.0".into(),
            prompt_pack_id: "PACK-TEST-001".into(),
            boundary: Boundary {
                max_tokens: 128,
                temperature: 0.0,
                timeout_ms: 5_000,
            },
            input_schema: Some(json!({
                "type": "object",
                "required": ["user_message"],
                "properties": {"user_message": {"type": "string"}}
            })),
            output_schema: Some(json!({
                "type": "object",
                "required": ["speech_act"],
                "properties": {"speech_act": {"type": "string"}}
            })),
            domain_tags: vec![],
            structured_output: None,
            tier: None,
        }
    }

    #[test]
    fn builtins_load_and_resolve() {
        let store = ContractStore::with_builtins();
        for id in ["PRC-CLS-001", "PRC-SYN-001", "PRC-CON-001"] {
            let contract = store.get(&ContractId::new(id));
            assert!(contract.is_some(), "missing builtin {id}");
        }
    }

    #[test]
    fn input_validation_enforces_schema() {
        let mut store = ContractStore::new();
        store.insert(minimal_contract("PRC-TST-001")).unwrap();
        let contract = store.get(&ContractId::new("PRC-TST-001")).unwrap();

        assert!(contract.validate_input(&json!({"user_message": "hi"})).is_ok());
        let errors = contract.validate_input(&json!({"wrong": 1})).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn output_validation_enforces_schema() {
        let mut store = ContractStore::new();
        store.insert(minimal_contract("PRC-TST-001")).unwrap();
        let contract = store.get(&ContractId::new("PRC-TST-001")).unwrap();

        assert!(contract.validate_output(&json!({"speech_act": "greeting"})).is_ok());
        assert!(contract.validate_output(&json!({"other": true})).is_err());
    }

    #[test]
    fn bad_contract_id_is_rejected() {
        let mut spec = minimal_contract("XXX-TST-001");
        spec.contract_id = ContractId::new("XXX-TST-001");
        let mut store = ContractStore::new();
        let err = store.insert(spec).unwrap_err();
        assert!(matches!(err, ContractError::Invalid { .. }));
    }

    #[test]
    fn missing_schemas_accept_anything() {
        let mut spec = minimal_contract("PRC-TST-002");
        spec.input_schema = None;
        spec.output_schema = None;
        let mut store = ContractStore::new();
        store.insert(spec).unwrap();
        let contract = store.get(&ContractId::new("PRC-TST-002")).unwrap();
        assert!(contract.validate_input(&json!(42)).is_ok());
        assert!(contract.validate_output(&json!(null)).is_ok());
    }

    #[tokio::test]
    async fn load_dir_reads_contract_files() {
        let dir = tempfile::tempdir().unwrap();
        let spec = minimal_contract("PRC-DIR-001");
        std::fs::write(
            dir.path().join("PRC-DIR-001.json"),
            serde_json::to_string_pretty(&spec).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut store = ContractStore::new();
        let loaded = store.load_dir(dir.path()).await.unwrap();
        assert_eq!(loaded, 1);
        assert!(store.get(&ContractId::new("PRC-DIR-001")).is_some());
    }

    #[test]
    fn boundary_timeout_defaults() {
        let spec: PromptContract = serde_json::from_value(json!({
            "contract_id": "PRC-DEF-001",
            "version": "1.0.0",
            "prompt_pack_id": "PACK-X",
            "boundary": {"max_tokens": 64, "temperature": 0.5}
        }))
        .unwrap();
        assert_eq!(spec.boundary.timeout_ms, 30_000);
    }
}

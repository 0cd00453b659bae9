//! Kernel configuration.
//!
//! One [`KernelConfig`] is loaded at startup (TOML or defaults) and injected
//! by value into each component at construction. There is no global config
//! and no runtime reloading.

use crate::id::{ContractId, ProviderId, ToolId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Process-wide budget enforcement mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMode {
    /// Violations reject the call / fail the work order.
    #[default]
    Enforce,
    /// Violations emit a BUDGET_WARNING event but processing continues.
    Warn,
    /// No budget check runs; debiting still occurs for telemetry.
    Off,
}

/// Token budget parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Session-wide token ceiling.
    pub session_token_limit: u64,
    /// Per-classify-WO allocation.
    pub classify_budget: u64,
    /// Per-synthesize-WO allocation.
    pub synthesize_budget: u64,
    /// Per-consolidate-WO allocation.
    pub consolidation_budget: u64,
    /// Tool-loop continuation threshold.
    pub followup_min_remaining: u64,
    /// Enforcement mode.
    pub budget_mode: BudgetMode,
    /// Tool-loop round bound.
    pub turn_limit: u32,
    /// Session timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            session_token_limit: 50_000,
            classify_budget: 2_000,
            synthesize_budget: 8_000,
            consolidation_budget: 2_000,
            followup_min_remaining: 200,
            budget_mode: BudgetMode::Enforce,
            turn_limit: 4,
            timeout_seconds: 600,
        }
    }
}

/// Signal-memory parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Opt-in for the memory plane. When false the supervisor neither logs
    /// signals nor reads biases.
    pub enabled: bool,
    /// Bistable gate: minimum accumulated count.
    pub gate_count_threshold: u64,
    /// Bistable gate: minimum distinct sessions.
    pub gate_session_threshold: u64,
    /// Bistable gate: no-re-fire window, hours.
    pub gate_window_hours: f64,
    /// Signal decay half-life, hours.
    pub decay_half_life_hours: f64,
    /// Minimum decayed salience for an overlay to count as an active bias.
    pub bias_salience_floor: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gate_count_threshold: 5,
            gate_session_threshold: 3,
            gate_window_hours: 72.0,
            decay_half_life_hours: 168.0,
            bias_salience_floor: 0.05,
        }
    }
}

/// One domain-tag route entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRoute {
    /// Provider serving this domain tag.
    pub provider_id: ProviderId,
    /// Model override for this route (None = provider default).
    pub model_id: Option<String>,
}

/// Gateway routing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Map from domain tag to route. First matching tag of a request wins;
    /// BTreeMap keeps resolution order deterministic.
    pub domain_tag_routes: BTreeMap<String, DomainRoute>,
    /// Fallback provider ID.
    pub default_provider: ProviderId,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            domain_tag_routes: BTreeMap::new(),
            default_provider: ProviderId::new("default"),
        }
    }
}

/// Supervisor (ho2) parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Agent class stamped into provenance metadata.
    pub agent_class: String,
    /// Quality-gate retry bound.
    pub max_retries: u32,
    /// Horizontal-context attention budget: recent ledger entries kept.
    pub attention_recent_entries: usize,
    /// Tools offered to synthesize work orders.
    pub tools_allowed: Vec<ToolId>,
    /// Contract for classify work orders.
    pub classify_contract: ContractId,
    /// Contract for synthesize work orders.
    pub synthesize_contract: ContractId,
    /// Contract for consolidate work orders.
    pub consolidate_contract: ContractId,
    /// Minimum response length the quality gate accepts.
    pub quality_min_length: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            agent_class: "assistant".into(),
            max_retries: 1,
            attention_recent_entries: 8,
            tools_allowed: vec![],
            classify_contract: ContractId::new("PRC-CLS-001"),
            synthesize_contract: ContractId::new("PRC-SYN-001"),
            consolidate_contract: ContractId::new("PRC-CON-001"),
            quality_min_length: 1,
        }
    }
}

/// Top-level kernel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Token budget parameters.
    pub budget: BudgetConfig,
    /// Signal-memory parameters.
    pub memory: MemoryConfig,
    /// Gateway routing parameters.
    pub gateway: GatewayConfig,
    /// Supervisor parameters.
    pub supervisor: SupervisorConfig,
}

/// Configuration loading errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML source did not parse.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config file could not be read.
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KernelConfig {
    /// Parse a configuration from TOML text. Missing sections and keys fall
    /// back to their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Load a configuration from a TOML file on disk.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = KernelConfig::default();
        assert_eq!(config.budget.budget_mode, BudgetMode::Enforce);
        assert!(config.budget.session_token_limit >= config.budget.synthesize_budget);
        assert!(config.memory.enabled);
        assert_eq!(config.supervisor.max_retries, 1);
    }

    #[test]
    fn partial_toml_overlays_defaults() {
        let config = KernelConfig::from_toml_str(
            r#"
            [budget]
            session_token_limit = 100
            budget_mode = "warn"

            [gateway]
            default_provider = "scripted"

            [gateway.domain_tag_routes.consolidation]
            provider_id = "cheap"
            model_id = "small-1"
            "#,
        )
        .unwrap();
        assert_eq!(config.budget.session_token_limit, 100);
        assert_eq!(config.budget.budget_mode, BudgetMode::Warn);
        // Unspecified keys keep their defaults.
        assert_eq!(config.budget.turn_limit, 4);
        assert_eq!(config.gateway.default_provider.as_str(), "scripted");
        let route = &config.gateway.domain_tag_routes["consolidation"];
        assert_eq!(route.provider_id.as_str(), "cheap");
        assert_eq!(route.model_id.as_deref(), Some("small-1"));
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let config = KernelConfig::from_toml_str("").unwrap();
        assert_eq!(config.budget.classify_budget, 2_000);
        assert_eq!(config.memory.gate_count_threshold, 5);
    }

    #[test]
    fn budget_mode_wire_names() {
        assert_eq!(serde_json::to_string(&BudgetMode::Off).unwrap(), "\"off\"");
        assert_eq!(
            serde_json::to_string(&BudgetMode::Enforce).unwrap(),
            "\"enforce\""
        );
    }
}

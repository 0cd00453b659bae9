//! Prompt request/response — the value objects between executor and gateway.
//!
//! These are the kernel's internal lingua franca. Providers convert to and
//! from these; nothing provider-specific leaks above the gateway.

use crate::error::ErrorCode;
use crate::id::{ContractId, LedgerId, ProviderId, SessionId, WorkOrderId};
use serde::{Deserialize, Serialize};

/// A single content part within a model reply.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// A tool use request from the model.
    ToolUse {
        /// Unique identifier for this tool use.
        id: String,
        /// Name of the tool to invoke.
        name: String,
        /// Tool input arguments.
        input: serde_json::Value,
    },
    /// Result from a tool execution, fed back to the model.
    ToolResult {
        /// The tool_use id this result corresponds to.
        tool_use_id: String,
        /// The result content, serialized.
        content: String,
        /// Whether the tool execution errored.
        is_error: bool,
    },
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Model produced a final response.
    Stop,
    /// Hit the max_tokens limit.
    Length,
    /// Model wants to use a tool.
    ToolUse,
}

/// Terminal status of one gateway exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Provider replied; budget debited; exchange logged.
    Success,
    /// The gateway refused the call (budget, unknown provider).
    Rejected,
    /// The provider failed (auth, rate limit, 5xx, timeout).
    Error,
}

/// Token usage from a single provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens generated.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Total tokens, input + output.
    pub fn total(self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// JSON-Schema description of a tool as the model sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolApi {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

/// Request from the executor to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    /// Contract governing this call; resolves the prompt pack.
    pub contract_id: ContractId,
    /// Model override (None = route's or provider's default).
    pub model_id: Option<String>,
    /// Explicit provider (None = domain-tag route, then default).
    pub provider_id: Option<ProviderId>,
    /// Maximum output tokens, from the contract boundary.
    pub max_tokens: u64,
    /// Sampling temperature, from the contract boundary.
    pub temperature: f64,
    /// Provider call timeout, from the contract boundary.
    pub timeout_ms: u64,
    /// Variables substituted into the prompt pack template.
    pub template_variables: serde_json::Value,
    /// Tools offered to the model (empty = none).
    #[serde(default)]
    pub tools: Vec<ToolApi>,
    /// Structured-output spec (mutually exclusive with `tools`).
    pub structured_output: Option<serde_json::Value>,
    /// Routing tags matched against the gateway's domain-tag map.
    #[serde(default)]
    pub domain_tags: Vec<String>,
    /// Provenance: owning session.
    pub session_id: SessionId,
    /// Provenance: owning work order.
    pub work_order_id: WorkOrderId,
}

/// Response from the gateway back to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResponse {
    /// Concatenated text content.
    pub content: String,
    /// Structured blocks preserving tool-use entries. None when the
    /// provider is a plain-text backend that reports no blocks.
    pub content_blocks: Option<Vec<ContentPart>>,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens generated.
    pub output_tokens: u64,
    /// Model that actually served the call.
    pub model_id: String,
    /// Provider that served the call.
    pub provider_id: ProviderId,
    /// Wall-clock round-trip in milliseconds.
    pub latency_ms: u64,
    /// Terminal status of the exchange.
    pub outcome: Outcome,
    /// Rejection/error code when `outcome != success`.
    pub error_code: Option<ErrorCode>,
    /// Ledger ID of the EXCHANGE event (success only).
    pub exchange_entry_id: Option<LedgerId>,
    /// Tokens debited for this call.
    pub cost_incurred: u64,
    /// Work-order budget remaining after the debit.
    pub budget_remaining: u64,
}

impl PromptResponse {
    /// A rejection response carrying no content.
    pub fn rejected(provider_id: ProviderId, code: ErrorCode, remaining: u64) -> Self {
        Self::terminal(provider_id, Outcome::Rejected, code, remaining)
    }

    /// A provider-error response carrying no content.
    pub fn error(provider_id: ProviderId, code: ErrorCode, remaining: u64) -> Self {
        Self::terminal(provider_id, Outcome::Error, code, remaining)
    }

    fn terminal(provider_id: ProviderId, outcome: Outcome, code: ErrorCode, remaining: u64) -> Self {
        Self {
            content: String::new(),
            content_blocks: None,
            finish_reason: FinishReason::Stop,
            input_tokens: 0,
            output_tokens: 0,
            model_id: String::new(),
            provider_id,
            latency_ms: 0,
            outcome,
            error_code: Some(code),
            exchange_entry_id: None,
            cost_incurred: 0,
            budget_remaining: remaining,
        }
    }

    /// Tool-use parts of `content_blocks`, in reply order.
    pub fn tool_uses(&self) -> Vec<(String, String, serde_json::Value)> {
        self.content_blocks
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_parts_are_tag_discriminated() {
        let part = ContentPart::ToolUse {
            id: "tu_1".into(),
            name: "grep".into(),
            input: json!({"pattern": "fn"}),
        };
        let v = serde_json::to_value(&part).unwrap();
        assert_eq!(v["type"], "tool_use");
        assert_eq!(v["name"], "grep");
    }

    #[test]
    fn finish_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&FinishReason::ToolUse).unwrap(),
            "\"tool_use\""
        );
        assert_eq!(serde_json::to_string(&Outcome::Rejected).unwrap(), "\"rejected\"");
    }

    #[test]
    fn tool_uses_extracts_in_order() {
        let response = PromptResponse {
            content: "".into(),
            content_blocks: Some(vec![
                ContentPart::Text { text: "thinking".into() },
                ContentPart::ToolUse {
                    id: "a".into(),
                    name: "grep".into(),
                    input: json!({}),
                },
                ContentPart::ToolUse {
                    id: "b".into(),
                    name: "read".into(),
                    input: json!({}),
                },
            ]),
            finish_reason: FinishReason::ToolUse,
            input_tokens: 10,
            output_tokens: 5,
            model_id: "m".into(),
            provider_id: ProviderId::new("p"),
            latency_ms: 3,
            outcome: Outcome::Success,
            error_code: None,
            exchange_entry_id: None,
            cost_incurred: 15,
            budget_remaining: 100,
        };
        let uses = response.tool_uses();
        assert_eq!(uses.len(), 2);
        assert_eq!(uses[0].1, "grep");
        assert_eq!(uses[1].1, "read");
    }

    #[test]
    fn rejected_response_has_no_content() {
        let r = PromptResponse::rejected(ProviderId::new("p"), ErrorCode::BudgetExceeded, 7);
        assert_eq!(r.outcome, Outcome::Rejected);
        assert_eq!(r.error_code, Some(ErrorCode::BudgetExceeded));
        assert!(r.content.is_empty());
        assert_eq!(r.budget_remaining, 7);
        assert!(r.tool_uses().is_empty());
    }
}

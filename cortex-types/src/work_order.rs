//! Work orders — the atomic unit of cognitive dispatch.

use crate::error::ErrorKind;
use crate::id::{ContractId, SessionId, ToolId, WorkOrderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of cognitive work a work order asks for.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WoType {
    /// Classify a user message (speech act + labels).
    Classify,
    /// Synthesize the user-facing response, possibly via tools.
    Synthesize,
    /// Direct tool invocation, no LLM involved.
    ToolCall,
    /// Distill accumulated signals into a memory overlay.
    Consolidate,
}

impl WoType {
    /// Wire name of the type (matches the serde representation).
    pub fn as_str(self) -> &'static str {
        match self {
            WoType::Classify => "classify",
            WoType::Synthesize => "synthesize",
            WoType::ToolCall => "tool_call",
            WoType::Consolidate => "consolidate",
        }
    }
}

/// Lifecycle state of a work order.
///
/// `planned → dispatched → executing → completed | failed`. A work order is
/// never mutated after reaching a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WoState {
    /// Created by the supervisor, not yet handed to the executor.
    Planned,
    /// Handed to the executor.
    Dispatched,
    /// The executor is working on it.
    Executing,
    /// Finished with a non-empty `output_result`.
    Completed,
    /// Finished with an `error`.
    Failed,
}

impl WoState {
    /// Whether the work order can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, WoState::Completed | WoState::Failed)
    }
}

/// Constraints the supervisor places on one work order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WoConstraints {
    /// Token reservation for this work order, debited from the session scope.
    pub token_budget: u64,
    /// Tools the executor may dispatch. Empty = no tools; extracted
    /// tool-use blocks are silently dropped (covers provider pseudo-tools
    /// for structured output).
    #[serde(default)]
    pub tools_allowed: Vec<ToolId>,
    /// Maximum tool-loop rounds before `turn_limit_exceeded`.
    pub turn_limit: u32,
    /// The prompt contract governing the LLM call.
    pub prompt_contract_id: ContractId,
    /// Routing tags matched against the gateway's domain-tag map.
    #[serde(default)]
    pub domain_tags: Vec<String>,
    /// Whether the contract's structured-output spec should be sent.
    /// Ignored when `tools_allowed` is non-empty (mutually exclusive).
    #[serde(default)]
    pub structured_output: bool,
    /// Minimum work-order budget that must remain for the tool loop to
    /// request a follow-up call.
    #[serde(default)]
    pub followup_min_remaining: u64,
}

/// Accumulated cost of one work order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WoCost {
    /// Input tokens across all LLM calls.
    pub input_tokens: u64,
    /// Output tokens across all LLM calls.
    pub output_tokens: u64,
    /// Number of LLM calls made.
    pub llm_calls: u32,
    /// Tool IDs dispatched, in invocation order (duplicates preserved).
    #[serde(default)]
    pub tool_ids_used: Vec<ToolId>,
}

impl WoCost {
    /// Total tokens, input + output.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Terminal failure attached to a failed work order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WoFailure {
    /// Classified failure kind.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl WoFailure {
    /// Create a failure record.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The atomic unit of cognitive dispatch.
///
/// Created by the supervisor in `planned` state, borrowed by the executor
/// for one `execute` call, returned as a completed (or failed) copy.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrder {
    /// Stable, monotonic-per-session ID: `WO-<session>-<NNN>`.
    pub wo_id: WorkOrderId,
    /// What kind of work this is.
    pub wo_type: WoType,
    /// Owning session.
    pub session_id: SessionId,
    /// Lifecycle state.
    pub state: WoState,
    /// Supervisor-imposed constraints.
    pub constraints: WoConstraints,
    /// Arbitrary JSON input. Validated against the contract's input schema
    /// by the executor; unknown fields stay opaque.
    pub input_context: serde_json::Value,
    /// JSON output, present and non-empty on every successful work order.
    pub output_result: Option<serde_json::Value>,
    /// Accumulated cost.
    pub cost: WoCost,
    /// When the supervisor planned this work order.
    pub created_at: DateTime<Utc>,
    /// When the executor reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Present on every failed work order.
    pub error: Option<WoFailure>,
}

impl WorkOrder {
    /// Create a freshly planned work order.
    pub fn new(
        wo_id: WorkOrderId,
        wo_type: WoType,
        session_id: SessionId,
        constraints: WoConstraints,
        input_context: serde_json::Value,
    ) -> Self {
        Self {
            wo_id,
            wo_type,
            session_id,
            state: WoState::Planned,
            constraints,
            input_context,
            output_result: None,
            cost: WoCost::default(),
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Transition into a successful terminal state.
    pub fn complete(&mut self, output: serde_json::Value) {
        self.state = WoState::Completed;
        self.output_result = Some(output);
        self.completed_at = Some(Utc::now());
    }

    /// Transition into a failed terminal state.
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.state = WoState::Failed;
        self.error = Some(WoFailure::new(kind, message));
        self.completed_at = Some(Utc::now());
    }
}

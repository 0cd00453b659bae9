//! Event-type names, enumerated per tier.
//!
//! Kept as `&str` constants rather than an enum: streams are long-lived
//! files and readers must tolerate event types written by newer versions.

/// Session opened (ho2).
pub const SESSION_START: &str = "SESSION_START";
/// Session closed with a cost summary (ho2).
pub const SESSION_END: &str = "SESSION_END";
/// One user turn persisted — exactly one per turn (ho2).
pub const TURN_RECORDED: &str = "TURN_RECORDED";
/// Work-order chain summary with trace hash (ho2).
pub const WO_CHAIN_COMPLETE: &str = "WO_CHAIN_COMPLETE";
/// Quality-gate verdict for a chain (ho2).
pub const WO_QUALITY_GATE: &str = "WO_QUALITY_GATE";
/// Quality-gate retries exhausted (ho2).
pub const ESCALATION: &str = "ESCALATION";
/// Supervisor caught an unexpected failure and degraded the turn (ho2).
pub const DEGRADATION: &str = "DEGRADATION";

/// Executor picked up a work order (ho1).
pub const WO_EXECUTING: &str = "WO_EXECUTING";
/// Work order reached the completed state (ho1).
pub const WO_COMPLETED: &str = "WO_COMPLETED";
/// Work order reached the failed state (ho1).
pub const WO_FAILED: &str = "WO_FAILED";
/// One gateway round-trip as seen by the executor (ho1).
pub const LLM_CALL: &str = "LLM_CALL";
/// One tool dispatch (ho1).
pub const TOOL_CALL: &str = "TOOL_CALL";

/// Full prompt/response exchange (hot).
pub const EXCHANGE: &str = "EXCHANGE";
/// Tokens debited from a budget scope (hot).
pub const BUDGET_DEBIT: &str = "BUDGET_DEBIT";
/// Budget violation observed outside enforce mode (hot).
pub const BUDGET_WARNING: &str = "BUDGET_WARNING";

/// Signal event appended to the memory plane (memory/signals).
pub const SIGNAL: &str = "SIGNAL";
/// Fresh overlay written (memory/overlays).
pub const OVERLAY: &str = "OVERLAY";
/// Overlay retired (memory/overlays).
pub const OVERLAY_DEACTIVATED: &str = "OVERLAY_DEACTIVATED";
/// Overlay weight adjusted or overlay re-activated (memory/overlays).
pub const OVERLAY_WEIGHT_UPDATED: &str = "OVERLAY_WEIGHT_UPDATED";

#![deny(missing_docs)]
//! # cortex-types — shared vocabulary for the cortex dispatch kernel
//!
//! This crate defines the value objects that cross every tier boundary:
//!
//! | Concern | Types |
//! |---------|-------|
//! | Identity | [`SessionId`], [`WorkOrderId`], [`LedgerId`], [`ProviderId`], [`ContractId`], [`ToolId`] |
//! | Dispatch | [`WorkOrder`], [`WoType`], [`WoState`], [`WoConstraints`], [`WoCost`] |
//! | Exchange | [`PromptRequest`], [`PromptResponse`], [`ContentPart`], [`FinishReason`], [`Outcome`] |
//! | Policy | [`BudgetMode`], [`KernelConfig`] and its sections |
//! | Failure | [`ErrorKind`], [`ErrorCode`] |
//!
//! ## Design Principle
//!
//! Every type here is data, not behavior. The tiers that act on these types
//! (gateway, executor, supervisor) live in their own crates and receive their
//! collaborators by value at construction — no module-level state, no
//! singletons. Unknown JSON under `input_context` / `output_result` stays an
//! opaque `serde_json::Value` subtree.

pub mod config;
pub mod error;
pub mod id;
pub mod prompt;
pub mod work_order;

pub use config::{
    BudgetConfig, BudgetMode, DomainRoute, GatewayConfig, KernelConfig, MemoryConfig,
    SupervisorConfig,
};
pub use error::{ErrorCode, ErrorKind};
pub use id::{ContractId, LedgerId, ProviderId, SessionId, ToolId, WorkOrderId};
pub use prompt::{
    ContentPart, FinishReason, Outcome, PromptRequest, PromptResponse, TokenUsage, ToolApi,
};
pub use work_order::{WoConstraints, WoCost, WoFailure, WoState, WoType, WorkOrder};

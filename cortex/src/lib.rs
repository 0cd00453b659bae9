#![deny(missing_docs)]
//! # cortex — umbrella crate
//!
//! One import surface over the dispatch kernel's tiers. Re-exports the
//! member crates behind feature flags, plus a `prelude` for the happy path.

#[cfg(feature = "core")]
pub use cortex_budget;
#[cfg(feature = "core")]
pub use cortex_contract;
#[cfg(feature = "executor")]
pub use cortex_executor;
#[cfg(feature = "gateway")]
pub use cortex_gateway;
#[cfg(feature = "core")]
pub use cortex_ledger;
#[cfg(feature = "memory")]
pub use cortex_memory;
#[cfg(feature = "core")]
pub use cortex_provider;
#[cfg(feature = "supervisor")]
pub use cortex_supervisor;
#[cfg(feature = "core")]
pub use cortex_tool;
#[cfg(feature = "core")]
pub use cortex_types;

/// Happy-path imports for composing a kernel.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use cortex_budget::{apply_policy, Budgeter, PolicyAction};
    #[cfg(feature = "core")]
    pub use cortex_contract::{ContractStore, PromptContract, PromptPackStore};
    #[cfg(feature = "executor")]
    pub use cortex_executor::Executor;
    #[cfg(feature = "gateway")]
    pub use cortex_gateway::Gateway;
    #[cfg(feature = "core")]
    pub use cortex_ledger::{EntryDraft, Ledger, LedgerEntry, LedgerStream};
    #[cfg(feature = "memory")]
    pub use cortex_memory::{MemoryPlane, OverlayDraft};
    #[cfg(feature = "core")]
    pub use cortex_provider::{Provider, ProviderError, ProviderRegistry};
    #[cfg(feature = "supervisor")]
    pub use cortex_supervisor::{SessionManager, Supervisor, TurnResult};
    #[cfg(feature = "core")]
    pub use cortex_tool::{ToolDispatcher, ToolHandler, ToolOutcome};
    #[cfg(feature = "core")]
    pub use cortex_types::{
        BudgetMode, KernelConfig, PromptRequest, PromptResponse, SessionId, WorkOrder,
        WorkOrderId,
    };
}

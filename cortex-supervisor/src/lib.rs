#![deny(missing_docs)]
//! # cortex-supervisor — the deliberative tier (ho2)
//!
//! One user turn in, one [`TurnResult`] out — always. The supervisor runs
//! the Kitchener loop (classify → retrieve → plan → execute → verify),
//! drives the memory plane, and never lets an exception escape the shell
//! boundary: failures degrade into a marked response with the turn still
//! persisted.

pub mod quality;
pub mod session;
pub mod supervisor;

pub use quality::{AcceptanceCriteria, GateDecision, QualityGate, QualityVerdict};
pub use session::{SessionManager, TurnRecord};
pub use supervisor::{
    ConsolidationReport, CostSummary, Supervisor, SupervisorError, TurnResult, WoSummary,
};

//! Ledger entries and the draft form callers hand to a stream.

use chrono::{DateTime, Utc};
use cortex_types::LedgerId;
use serde::{Deserialize, Serialize};

/// One frozen record in a stream.
///
/// Field order is not significant on disk; canonical JSON is used only for
/// hashing. `prev_hash` is the chain hash of the preceding entry, or
/// [`crate::ZERO_HASH`] for the first entry of a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// `LED-<8 hex>`, assigned at write time.
    pub id: LedgerId,
    /// Event-type name from the tier's enumerated set.
    pub event_type: String,
    /// Work-order ID or session ID this entry is about.
    pub submission_id: String,
    /// Short status string (`ok`, `accept`, `reject`, `error`, …).
    pub decision: String,
    /// Free-text explanation.
    pub reason: String,
    /// UTC timestamp, assigned at write time unless the draft pinned one.
    pub timestamp: DateTime<Utc>,
    /// Prompt-pack IDs involved in this event.
    #[serde(default)]
    pub prompts_used: Vec<String>,
    /// Nested JSON following the metadata key standard
    /// (`scope.*`, `provenance.*`, `relational.*`).
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Chain hash of the previous entry.
    pub prev_hash: String,
}

/// What a caller provides; the stream fills in `id`, `timestamp`, and
/// `prev_hash` at write time.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    /// Event-type name.
    pub event_type: String,
    /// Work-order ID or session ID this entry is about.
    pub submission_id: String,
    /// Short status string.
    pub decision: String,
    /// Free-text explanation.
    pub reason: String,
    /// Prompt-pack IDs involved.
    pub prompts_used: Vec<String>,
    /// Nested metadata JSON.
    pub metadata: serde_json::Value,
    /// Pinned timestamp for replay-deterministic writes. None = wall clock.
    pub at: Option<DateTime<Utc>>,
}

impl EntryDraft {
    /// Start a draft with the two required fields.
    pub fn new(event_type: impl Into<String>, submission_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            submission_id: submission_id.into(),
            decision: String::new(),
            reason: String::new(),
            prompts_used: vec![],
            metadata: serde_json::Value::Null,
            at: None,
        }
    }

    /// Set the decision string.
    #[must_use]
    pub fn decision(mut self, decision: impl Into<String>) -> Self {
        self.decision = decision.into();
        self
    }

    /// Set the reason text.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set the prompt-pack IDs.
    #[must_use]
    pub fn prompts(mut self, prompts: Vec<String>) -> Self {
        self.prompts_used = prompts;
        self
    }

    /// Set the metadata object.
    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Pin the timestamp (replay-deterministic writes).
    #[must_use]
    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.at = Some(ts);
        self
    }
}

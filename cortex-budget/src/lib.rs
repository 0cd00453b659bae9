#![deny(missing_docs)]
//! # cortex-budget — hierarchical token budgeter
//!
//! Three scopes: the session ceiling, per-work-order reservations carved out
//! of it, and per-call debits against the work order. One [`BudgetMode`]
//! drives every branch point through [`apply_policy`]:
//!
//! | Mode | Violation effect |
//! |------|------------------|
//! | `enforce` | Call rejected / work order failed |
//! | `warn` | `BUDGET_WARNING` event, processing continues |
//! | `off` | No check; debits still recorded for telemetry |
//!
//! Scope state is mutated only through [`Budgeter::allocate`] and
//! [`Budgeter::debit`], serialized by an internal lock. Consumers hold only
//! scope identifiers (session ID, work-order ID).

use cortex_ledger::{event, EntryDraft, LedgerStream};
use cortex_types::{BudgetMode, LedgerId, SessionId, TokenUsage, WorkOrderId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Budget errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BudgetError {
    /// A reservation or debit exceeded the parent scope in enforce mode.
    #[error("budget exceeded in {scope}: requested {requested}, remaining {remaining}")]
    Exceeded {
        /// Scope identifier that rejected the request.
        scope: String,
        /// Tokens requested.
        requested: u64,
        /// Tokens remaining in the scope.
        remaining: u64,
    },

    /// The named scope was never opened.
    #[error("unknown budget scope: {0}")]
    UnknownScope(String),
}

/// What a mode-aware branch point should do about a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    /// No violation, or mode `off`: proceed.
    Continue,
    /// Mode `warn`: emit a BUDGET_WARNING and proceed.
    Warn,
    /// Mode `enforce`: reject the call / fail the work order.
    Fail,
}

/// The single policy branch shared by the gateway pre-check, the gateway
/// post-call, and the executor's follow-up check.
pub fn apply_policy(violation: bool, mode: BudgetMode) -> PolicyAction {
    if !violation {
        return PolicyAction::Continue;
    }
    match mode {
        BudgetMode::Enforce => PolicyAction::Fail,
        BudgetMode::Warn => PolicyAction::Warn,
        BudgetMode::Off => PolicyAction::Continue,
    }
}

/// Result of a non-mutating pre-call check.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetCheck {
    /// Whether the call may proceed under the current mode.
    pub allowed: bool,
    /// Whether the estimate exceeded the scope (regardless of mode).
    pub violation: bool,
    /// Tokens remaining in the work-order scope.
    pub remaining: u64,
    /// Explanation, empty when within budget.
    pub reason: String,
}

/// Result of a post-call debit.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetDebit {
    /// False only when the scope was unknown.
    pub success: bool,
    /// Tokens remaining in the work-order scope after the debit.
    pub remaining: u64,
    /// Total tokens consumed by the work order so far.
    pub total_consumed: u64,
    /// Tokens debited by this call.
    pub cost_incurred: u64,
    /// BUDGET_DEBIT entry, when the ledger write succeeded.
    pub ledger_entry_id: Option<LedgerId>,
}

#[derive(Debug)]
struct SessionScope {
    allocated: u64,
    consumed: u64,
    /// Sum of live work-order reservations.
    reserved: u64,
}

#[derive(Debug)]
struct WoScope {
    session: SessionId,
    allocated: u64,
    consumed: u64,
    released: bool,
}

#[derive(Default)]
struct Scopes {
    sessions: HashMap<String, SessionScope>,
    work_orders: HashMap<String, WoScope>,
}

/// The budgeter. Owns all scope state; writes `BUDGET_DEBIT` and
/// `BUDGET_WARNING` events to the hot stream.
pub struct Budgeter {
    mode: BudgetMode,
    ledger: Arc<LedgerStream>,
    scopes: Mutex<Scopes>,
}

impl Budgeter {
    /// Create a budgeter in the given mode, writing events to the hot stream.
    pub fn new(mode: BudgetMode, ledger: Arc<LedgerStream>) -> Self {
        Self {
            mode,
            ledger,
            scopes: Mutex::new(Scopes::default()),
        }
    }

    /// Current process-wide mode.
    pub fn mode(&self) -> BudgetMode {
        self.mode
    }

    /// Open a session scope with the configured ceiling. Idempotent.
    pub fn open_session(&self, session_id: &SessionId, limit: u64) {
        let mut scopes = self.scopes.lock().expect("budget lock poisoned");
        scopes
            .sessions
            .entry(session_id.to_string())
            .or_insert(SessionScope {
                allocated: limit,
                consumed: 0,
                reserved: 0,
            });
    }

    /// Reserve `amount` tokens from the session for a work order.
    ///
    /// Over-reservation is an error in `enforce`, a `BUDGET_WARNING` in
    /// `warn`, and ignored in `off`. The reservation is recorded in all
    /// modes so debits stay attributable.
    pub async fn allocate(
        &self,
        session_id: &SessionId,
        wo_id: &WorkOrderId,
        amount: u64,
    ) -> Result<(), BudgetError> {
        let violation = {
            let mut scopes = self.scopes.lock().expect("budget lock poisoned");
            let session = scopes
                .sessions
                .get_mut(session_id.as_str())
                .ok_or_else(|| BudgetError::UnknownScope(session_id.to_string()))?;
            let available = session.allocated.saturating_sub(session.reserved);
            let violation = amount > available;
            if violation && self.mode == BudgetMode::Enforce {
                return Err(BudgetError::Exceeded {
                    scope: session_id.to_string(),
                    requested: amount,
                    remaining: available,
                });
            }
            session.reserved += amount;
            scopes.work_orders.insert(
                wo_id.to_string(),
                WoScope {
                    session: session_id.clone(),
                    allocated: amount,
                    consumed: 0,
                    released: false,
                },
            );
            violation
        };
        if violation && self.mode == BudgetMode::Warn {
            self.warn(
                wo_id.as_str(),
                format!("work-order reservation of {amount} exceeds session remainder"),
            )
            .await;
        }
        Ok(())
    }

    /// Reserve up to `requested` tokens, clamped to what the session still
    /// has. Used at plan time so a turn late in a session degrades through
    /// the executor's budget checks instead of failing at reservation.
    ///
    /// Returns the granted amount. In `enforce` a fully exhausted session
    /// is still an error; in `warn` and `off` the full request is granted.
    pub async fn allocate_clamped(
        &self,
        session_id: &SessionId,
        wo_id: &WorkOrderId,
        requested: u64,
    ) -> Result<u64, BudgetError> {
        let granted = match self.mode {
            BudgetMode::Enforce => {
                let scopes = self.scopes.lock().expect("budget lock poisoned");
                let session = scopes
                    .sessions
                    .get(session_id.as_str())
                    .ok_or_else(|| BudgetError::UnknownScope(session_id.to_string()))?;
                let available = session.allocated.saturating_sub(session.reserved);
                if available == 0 {
                    return Err(BudgetError::Exceeded {
                        scope: session_id.to_string(),
                        requested,
                        remaining: 0,
                    });
                }
                requested.min(available)
            }
            BudgetMode::Warn | BudgetMode::Off => requested,
        };
        self.allocate(session_id, wo_id, granted).await?;
        Ok(granted)
    }

    /// Non-mutating pre-call check of `estimated` tokens against the
    /// work-order scope.
    pub fn check(&self, wo_id: &WorkOrderId, estimated: u64) -> BudgetCheck {
        let scopes = self.scopes.lock().expect("budget lock poisoned");
        let Some(wo) = scopes.work_orders.get(wo_id.as_str()) else {
            return BudgetCheck {
                allowed: false,
                violation: true,
                remaining: 0,
                reason: format!("unknown work-order scope {wo_id}"),
            };
        };
        let remaining = wo.allocated.saturating_sub(wo.consumed);
        let violation = self.mode != BudgetMode::Off && estimated > remaining;
        BudgetCheck {
            allowed: !(violation && self.mode == BudgetMode::Enforce),
            violation,
            remaining,
            reason: if violation {
                format!("estimated {estimated} tokens exceeds remaining {remaining}")
            } else {
                String::new()
            },
        }
    }

    /// Tokens remaining in a work-order scope (0 for unknown scopes).
    pub fn remaining(&self, wo_id: &WorkOrderId) -> u64 {
        let scopes = self.scopes.lock().expect("budget lock poisoned");
        scopes
            .work_orders
            .get(wo_id.as_str())
            .map(|wo| wo.allocated.saturating_sub(wo.consumed))
            .unwrap_or(0)
    }

    /// Record actual usage after a call. Accounts tokens in every mode,
    /// cascades into the session scope, and writes a `BUDGET_DEBIT` event.
    pub async fn debit(&self, wo_id: &WorkOrderId, usage: TokenUsage) -> BudgetDebit {
        let amount = usage.total();
        let (session_id, remaining, total_consumed, session_remaining) = {
            let mut scopes = self.scopes.lock().expect("budget lock poisoned");
            let Some(wo) = scopes.work_orders.get_mut(wo_id.as_str()) else {
                return BudgetDebit {
                    success: false,
                    remaining: 0,
                    total_consumed: 0,
                    cost_incurred: amount,
                    ledger_entry_id: None,
                };
            };
            wo.consumed += amount;
            let remaining = wo.allocated.saturating_sub(wo.consumed);
            let total_consumed = wo.consumed;
            let session_id = wo.session.clone();
            let session_remaining = match scopes.sessions.get_mut(session_id.as_str()) {
                Some(session) => {
                    session.consumed += amount;
                    session.allocated.saturating_sub(session.consumed)
                }
                None => 0,
            };
            (session_id, remaining, total_consumed, session_remaining)
        };

        let entry_id = self
            .ledger
            .write_lossy(
                EntryDraft::new(event::BUDGET_DEBIT, wo_id.as_str())
                    .decision("debited")
                    .metadata(serde_json::json!({
                        "scope": { "tier": "hot" },
                        "provenance": { "session_id": session_id, "work_order_id": wo_id },
                        "debit": {
                            "input_tokens": usage.input_tokens,
                            "output_tokens": usage.output_tokens,
                            "amount": amount,
                            "work_order_remaining": remaining,
                            "session_remaining": session_remaining,
                        },
                    })),
            )
            .await;

        BudgetDebit {
            success: true,
            remaining,
            total_consumed,
            cost_incurred: amount,
            ledger_entry_id: entry_id,
        }
    }

    /// Return a completed work order's unused reservation to the session.
    /// Idempotent.
    pub fn release(&self, wo_id: &WorkOrderId) {
        let mut scopes = self.scopes.lock().expect("budget lock poisoned");
        let Some(wo) = scopes.work_orders.get_mut(wo_id.as_str()) else {
            return;
        };
        if wo.released {
            return;
        }
        wo.released = true;
        // The session keeps the consumed share reserved; only the unused
        // remainder of the reservation comes back.
        let give_back = wo.allocated.saturating_sub(wo.consumed);
        let session = wo.session.clone();
        if let Some(session) = scopes.sessions.get_mut(session.as_str()) {
            session.reserved = session.reserved.saturating_sub(give_back);
        }
    }

    /// Total tokens consumed by a session across all its work orders.
    pub fn session_consumed(&self, session_id: &SessionId) -> u64 {
        let scopes = self.scopes.lock().expect("budget lock poisoned");
        scopes
            .sessions
            .get(session_id.as_str())
            .map(|s| s.consumed)
            .unwrap_or(0)
    }

    /// Write a `BUDGET_WARNING` event on behalf of a mode-aware branch point.
    pub async fn warn(&self, submission_id: &str, reason: String) {
        tracing::warn!(%submission_id, %reason, "budget warning");
        self.ledger
            .write_lossy(
                EntryDraft::new(event::BUDGET_WARNING, submission_id)
                    .decision("warned")
                    .reason(reason),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn budgeter(mode: BudgetMode, dir: &tempfile::TempDir) -> Budgeter {
        let stream = LedgerStream::open(dir.path().join("hot.jsonl")).await.unwrap();
        Budgeter::new(mode, Arc::new(stream))
    }

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[test]
    fn policy_matrix() {
        assert_eq!(apply_policy(false, BudgetMode::Enforce), PolicyAction::Continue);
        assert_eq!(apply_policy(true, BudgetMode::Enforce), PolicyAction::Fail);
        assert_eq!(apply_policy(true, BudgetMode::Warn), PolicyAction::Warn);
        assert_eq!(apply_policy(true, BudgetMode::Off), PolicyAction::Continue);
    }

    #[tokio::test]
    async fn allocate_and_debit_cascade() {
        let dir = tempfile::tempdir().unwrap();
        let b = budgeter(BudgetMode::Enforce, &dir).await;
        let session = SessionId::new("SES-1");
        let wo = WorkOrderId::new("WO-SES-1-001");

        b.open_session(&session, 1000);
        b.allocate(&session, &wo, 400).await.unwrap();

        let debit = b.debit(&wo, usage(100, 50)).await;
        assert!(debit.success);
        assert_eq!(debit.cost_incurred, 150);
        assert_eq!(debit.remaining, 250);
        assert_eq!(debit.total_consumed, 150);
        assert!(debit.ledger_entry_id.is_some());
        assert_eq!(b.session_consumed(&session), 150);
    }

    #[tokio::test]
    async fn enforce_rejects_over_reservation() {
        let dir = tempfile::tempdir().unwrap();
        let b = budgeter(BudgetMode::Enforce, &dir).await;
        let session = SessionId::new("SES-1");
        b.open_session(&session, 100);

        b.allocate(&session, &WorkOrderId::new("WO-1"), 80)
            .await
            .unwrap();
        let err = b
            .allocate(&session, &WorkOrderId::new("WO-2"), 80)
            .await
            .unwrap_err();
        assert!(matches!(err, BudgetError::Exceeded { remaining: 20, .. }));
    }

    #[tokio::test]
    async fn warn_mode_reserves_and_warns() {
        let dir = tempfile::tempdir().unwrap();
        let b = budgeter(BudgetMode::Warn, &dir).await;
        let session = SessionId::new("SES-1");
        b.open_session(&session, 100);

        // Over-reservation goes through in warn mode.
        b.allocate(&session, &WorkOrderId::new("WO-1"), 500)
            .await
            .unwrap();
        assert_eq!(b.remaining(&WorkOrderId::new("WO-1")), 500);
    }

    #[tokio::test]
    async fn check_respects_mode() {
        let dir = tempfile::tempdir().unwrap();
        let b = budgeter(BudgetMode::Enforce, &dir).await;
        let session = SessionId::new("SES-1");
        let wo = WorkOrderId::new("WO-1");
        b.open_session(&session, 1000);
        b.allocate(&session, &wo, 100).await.unwrap();

        let ok = b.check(&wo, 50);
        assert!(ok.allowed);
        assert!(!ok.violation);

        let too_much = b.check(&wo, 200);
        assert!(!too_much.allowed);
        assert!(too_much.violation);
        assert_eq!(too_much.remaining, 100);
    }

    #[tokio::test]
    async fn off_mode_always_allows_but_still_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let b = budgeter(BudgetMode::Off, &dir).await;
        let session = SessionId::new("SES-1");
        let wo = WorkOrderId::new("WO-1");
        b.open_session(&session, 10);
        b.allocate(&session, &wo, 10_000).await.unwrap();

        let check = b.check(&wo, 1_000_000);
        assert!(check.allowed);
        assert!(!check.violation);

        let debit = b.debit(&wo, usage(500, 500)).await;
        assert!(debit.success);
        assert_eq!(b.session_consumed(&session), 1000);
    }

    #[tokio::test]
    async fn clamped_allocation_grants_session_remainder() {
        let dir = tempfile::tempdir().unwrap();
        let b = budgeter(BudgetMode::Enforce, &dir).await;
        let session = SessionId::new("SES-1");
        b.open_session(&session, 100);

        let first = WorkOrderId::new("WO-1");
        let granted = b.allocate_clamped(&session, &first, 30).await.unwrap();
        assert_eq!(granted, 30);
        b.debit(&first, usage(5, 5)).await;
        b.release(&first);

        // 10 consumed stays reserved; 90 available for the next order.
        let second = WorkOrderId::new("WO-2");
        let granted = b.allocate_clamped(&session, &second, 100).await.unwrap();
        assert_eq!(granted, 90);
    }

    #[tokio::test]
    async fn exhausted_session_fails_clamped_allocation_in_enforce() {
        let dir = tempfile::tempdir().unwrap();
        let b = budgeter(BudgetMode::Enforce, &dir).await;
        let session = SessionId::new("SES-1");
        b.open_session(&session, 50);
        b.allocate(&session, &WorkOrderId::new("WO-1"), 50)
            .await
            .unwrap();

        let err = b
            .allocate_clamped(&session, &WorkOrderId::new("WO-2"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, BudgetError::Exceeded { .. }));
    }

    #[tokio::test]
    async fn debit_unknown_scope_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let b = budgeter(BudgetMode::Enforce, &dir).await;
        let debit = b.debit(&WorkOrderId::new("WO-missing"), usage(1, 1)).await;
        assert!(!debit.success);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let b = budgeter(BudgetMode::Enforce, &dir).await;
        let session = SessionId::new("SES-1");
        let wo = WorkOrderId::new("WO-1");
        b.open_session(&session, 100);
        b.allocate(&session, &wo, 60).await.unwrap();
        b.debit(&wo, usage(10, 0)).await;

        b.release(&wo);
        b.release(&wo);

        // 10 consumed + 90 available: a 90-token reservation must fit.
        b.allocate(&session, &WorkOrderId::new("WO-2"), 90)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn debits_write_ledger_events() {
        let dir = tempfile::tempdir().unwrap();
        let stream = Arc::new(
            LedgerStream::open(dir.path().join("hot.jsonl")).await.unwrap(),
        );
        let b = Budgeter::new(BudgetMode::Enforce, Arc::clone(&stream));
        let session = SessionId::new("SES-1");
        let wo = WorkOrderId::new("WO-1");
        b.open_session(&session, 100);
        b.allocate(&session, &wo, 50).await.unwrap();
        b.debit(&wo, usage(10, 10)).await;

        let debits = stream.read_by_event_type(event::BUDGET_DEBIT).await.unwrap();
        assert_eq!(debits.len(), 1);
        assert_eq!(debits[0].submission_id, "WO-1");
        assert_eq!(debits[0].metadata["debit"]["amount"], 20);
    }
}

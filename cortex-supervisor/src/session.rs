//! Session lifecycle and monotonic work-order IDs.
//!
//! The in-memory turn history is a convenience; the ho2 ledger is the
//! authority. Every user turn produces exactly one TURN_RECORDED event —
//! including on degradation, quality-gate escalation, and budget
//! exhaustion. No terminal path may skip it.

use chrono::{DateTime, Utc};
use cortex_ledger::{event, EntryDraft, LedgerStream, Provenance};
use cortex_types::{SessionId, WorkOrderId};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// One recorded turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    /// 1-based turn number.
    pub turn_number: u64,
    /// What the user sent.
    pub user_message: String,
    /// What the kernel answered.
    pub response: String,
    /// When the turn was recorded.
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct SessionState {
    turn_count: u64,
    wo_seq: u32,
    history: Vec<TurnRecord>,
}

/// Session lifecycle manager. Writes SESSION_START / TURN_RECORDED /
/// SESSION_END to the ho2 stream.
pub struct SessionManager {
    ledger: Arc<LedgerStream>,
    agent_class: String,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl SessionManager {
    /// Create a manager writing to the ho2 stream.
    pub fn new(ledger: Arc<LedgerStream>, agent_class: impl Into<String>) -> Self {
        Self {
            ledger,
            agent_class: agent_class.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Open a fresh session: `SES-<8 hex>` plus a SESSION_START event.
    pub async fn start_session(&self) -> SessionId {
        let id = SessionId::new(format!(
            "SES-{}",
            &Uuid::new_v4().simple().to_string()[..8]
        ));
        self.ensure_session(&id).await;
        id
    }

    /// Make sure a session is tracked, writing SESSION_START on first sight.
    pub async fn ensure_session(&self, session_id: &SessionId) {
        let fresh = {
            let mut sessions = self.sessions.lock().expect("session lock poisoned");
            if sessions.contains_key(session_id.as_str()) {
                false
            } else {
                sessions.insert(
                    session_id.to_string(),
                    SessionState {
                        turn_count: 0,
                        wo_seq: 0,
                        history: vec![],
                    },
                );
                true
            }
        };
        if fresh {
            self.ledger
                .write_lossy(
                    EntryDraft::new(event::SESSION_START, session_id.as_str())
                        .decision("started")
                        .metadata(
                            Provenance::session(session_id)
                                .agent_class(&self.agent_class)
                                .metadata("ho2", Value::Null),
                        ),
                )
                .await;
        }
    }

    /// Close a session with a cost summary.
    pub async fn end_session(&self, session_id: &SessionId, summary: Value) {
        let turn_count = self.turn_count(session_id);
        self.ledger
            .write_lossy(
                EntryDraft::new(event::SESSION_END, session_id.as_str())
                    .decision("ended")
                    .metadata(
                        Provenance::session(session_id)
                            .agent_class(&self.agent_class)
                            .turn(turn_count)
                            .metadata("ho2", json!({"summary": summary})),
                    ),
            )
            .await;
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .remove(session_id.as_str());
    }

    /// Persist one user turn. Returns the turn number.
    pub async fn add_turn(
        &self,
        session_id: &SessionId,
        user_message: &str,
        response: &str,
    ) -> u64 {
        let turn_number = {
            let mut sessions = self.sessions.lock().expect("session lock poisoned");
            let state = sessions
                .entry(session_id.to_string())
                .or_insert_with(|| SessionState {
                    turn_count: 0,
                    wo_seq: 0,
                    history: vec![],
                });
            state.turn_count += 1;
            let turn_number = state.turn_count;
            state.history.push(TurnRecord {
                turn_number,
                user_message: user_message.to_string(),
                response: response.to_string(),
                at: Utc::now(),
            });
            turn_number
        };
        self.ledger
            .write_lossy(
                EntryDraft::new(event::TURN_RECORDED, session_id.as_str())
                    .decision("recorded")
                    .metadata(
                        Provenance::session(session_id)
                            .agent_class(&self.agent_class)
                            .turn(turn_number)
                            .metadata(
                                "ho2",
                                json!({
                                    "turn": {
                                        "user_message": user_message,
                                        "response": response,
                                    }
                                }),
                            ),
                    ),
            )
            .await;
        turn_number
    }

    /// The next monotonic work-order ID: `WO-<session>-<NNN>`.
    pub fn next_wo_id(&self, session_id: &SessionId) -> WorkOrderId {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        let state = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState {
                turn_count: 0,
                wo_seq: 0,
                history: vec![],
            });
        state.wo_seq += 1;
        WorkOrderId::new(format!("WO-{session_id}-{:03}", state.wo_seq))
    }

    /// Turns recorded so far.
    pub fn turn_count(&self, session_id: &SessionId) -> u64 {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .get(session_id.as_str())
            .map(|s| s.turn_count)
            .unwrap_or(0)
    }

    /// In-memory history copy (not authoritative; the ledger is).
    pub fn history(&self, session_id: &SessionId) -> Vec<TurnRecord> {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .get(session_id.as_str())
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager(dir: &tempfile::TempDir) -> (SessionManager, Arc<LedgerStream>) {
        let ledger = Arc::new(
            LedgerStream::open(dir.path().join("ho2/ho2m.jsonl"))
                .await
                .unwrap(),
        );
        (SessionManager::new(Arc::clone(&ledger), "assistant"), ledger)
    }

    #[tokio::test]
    async fn session_ids_have_expected_shape() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, ledger) = manager(&dir).await;
        let id = manager.start_session().await;
        assert!(id.as_str().starts_with("SES-"));
        assert_eq!(id.as_str().len(), 12);

        let starts = ledger.read_by_event_type(event::SESSION_START).await.unwrap();
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].metadata["provenance"]["agent_class"], "assistant");
    }

    #[tokio::test]
    async fn ensure_session_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, ledger) = manager(&dir).await;
        let id = SessionId::new("SES-fixed");
        manager.ensure_session(&id).await;
        manager.ensure_session(&id).await;
        let starts = ledger.read_by_event_type(event::SESSION_START).await.unwrap();
        assert_eq!(starts.len(), 1);
    }

    #[tokio::test]
    async fn wo_ids_are_monotonic_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(&dir).await;
        let a = manager.start_session().await;
        let b = manager.start_session().await;

        assert_eq!(manager.next_wo_id(&a).as_str(), format!("WO-{a}-001"));
        assert_eq!(manager.next_wo_id(&a).as_str(), format!("WO-{a}-002"));
        // Sequences are independent per session.
        assert_eq!(manager.next_wo_id(&b).as_str(), format!("WO-{b}-001"));
    }

    #[tokio::test]
    async fn add_turn_records_exactly_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, ledger) = manager(&dir).await;
        let id = manager.start_session().await;

        let n1 = manager.add_turn(&id, "hello", "hi there").await;
        let n2 = manager.add_turn(&id, "again", "welcome back").await;
        assert_eq!((n1, n2), (1, 2));
        assert_eq!(manager.turn_count(&id), 2);

        let recorded = ledger.read_by_event_type(event::TURN_RECORDED).await.unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].metadata["turn"]["user_message"], "hello");
        assert_eq!(recorded[1].metadata["provenance"]["turn_number"], 2);
    }

    #[tokio::test]
    async fn end_session_writes_summary() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, ledger) = manager(&dir).await;
        let id = manager.start_session().await;
        manager.add_turn(&id, "hi", "hello").await;
        manager
            .end_session(&id, json!({"total_tokens": 123}))
            .await;

        let ends = ledger.read_by_event_type(event::SESSION_END).await.unwrap();
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].metadata["summary"]["total_tokens"], 123);
        assert_eq!(ends[0].metadata["provenance"]["turn_number"], 1);
    }

    #[tokio::test]
    async fn history_reflects_turns() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(&dir).await;
        let id = manager.start_session().await;
        manager.add_turn(&id, "one", "1").await;
        manager.add_turn(&id, "two", "2").await;
        let history = manager.history(&id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].user_message, "two");
    }
}

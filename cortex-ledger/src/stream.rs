//! One append-only stream: writes, scans, chain verification.

use crate::entry::{EntryDraft, LedgerEntry};
use chrono::Utc;
use cortex_types::LedgerId;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Chain hash of "nothing": prev_hash of the first entry in a stream.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Stream errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Filesystem transport failed.
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored line did not parse as an entry.
    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One detected discontinuity from `verify_chain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    /// Zero-based index of the offending entry.
    pub index: usize,
    /// ID of the offending entry.
    pub entry_id: LedgerId,
    /// Hash the chain required at this point.
    pub expected: String,
    /// Hash the entry actually stored.
    pub found: String,
}

/// Serialize a JSON value canonically: sorted keys, no insignificant
/// whitespace. `serde_json`'s map is BTreeMap-backed, so any value routed
/// through `serde_json::Value` comes out key-sorted.
pub fn canonical_json(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Chain hash of one entry: canonical JSON of the entry minus its
/// `prev_hash` field, concatenated with that `prev_hash`.
fn entry_hash(entry: &LedgerEntry) -> String {
    let mut value = serde_json::to_value(entry).unwrap_or_default();
    if let Some(map) = value.as_object_mut() {
        map.remove("prev_hash");
    }
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&value).as_bytes());
    hasher.update(entry.prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

fn fresh_entry_id() -> LedgerId {
    let hex = Uuid::new_v4().simple().to_string();
    LedgerId::new(format!("LED-{}", &hex[..8]))
}

struct StreamState {
    /// Hash of the last written entry — the sidecar cache that saves
    /// re-reading the file on every write.
    last_hash: String,
}

/// A single append-only JSONL stream.
///
/// Exactly one component writes a given stream; the async lock serializes
/// those writes. Readers scan without the lock.
pub struct LedgerStream {
    path: PathBuf,
    state: Mutex<StreamState>,
}

impl LedgerStream {
    /// Open a stream at the given path, creating parent directories lazily.
    /// If the file already holds entries, the chain continues from the last
    /// one — restarts do not break verification.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let last_hash = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let mut hash = ZERO_HASH.to_string();
                for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                    let entry: LedgerEntry = serde_json::from_str(line)?;
                    hash = entry_hash(&entry);
                }
                hash
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ZERO_HASH.to_string(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            state: Mutex::new(StreamState { last_hash }),
        })
    }

    /// Append an entry. Holds the stream lock for the whole
    /// write-and-flush; the entry is durable when this returns.
    pub async fn write(&self, draft: EntryDraft) -> Result<LedgerId, LedgerError> {
        let mut state = self.state.lock().await;
        let entry = LedgerEntry {
            id: fresh_entry_id(),
            event_type: draft.event_type,
            submission_id: draft.submission_id,
            decision: draft.decision,
            reason: draft.reason,
            timestamp: draft.at.unwrap_or_else(Utc::now),
            prompts_used: draft.prompts_used,
            metadata: draft.metadata,
            prev_hash: state.last_hash.clone(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;

        state.last_hash = entry_hash(&entry);
        Ok(entry.id)
    }

    /// Append, logging instead of failing. Audit loss is reported but never
    /// takes the turn down with it.
    pub async fn write_lossy(&self, draft: EntryDraft) -> Option<LedgerId> {
        let event_type = draft.event_type.clone();
        match self.write(draft).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(stream = %self.path.display(), %event_type, error = %e,
                    "ledger write failed; continuing without audit entry");
                eprintln!(
                    "ledger write failed on {}: {e} (event {event_type})",
                    self.path.display()
                );
                None
            }
        }
    }

    /// All entries, in append order.
    pub async fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    /// Entries whose `submission_id` matches, in append order.
    pub async fn read_by_submission(&self, id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| e.submission_id == id)
            .collect())
    }

    /// Entries whose `event_type` matches, in append order.
    pub async fn read_by_event_type(&self, ty: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| e.event_type == ty)
            .collect())
    }

    /// Recompute every hash in the stream and report discontinuities.
    /// An empty result means the chain is intact.
    pub async fn verify_chain(&self) -> Result<Vec<ChainBreak>, LedgerError> {
        let entries = self.read_all().await?;
        let mut breaks = Vec::new();
        let mut expected = ZERO_HASH.to_string();
        for (index, entry) in entries.iter().enumerate() {
            if entry.prev_hash != expected {
                breaks.push(ChainBreak {
                    index,
                    entry_id: entry.id.clone(),
                    expected: expected.clone(),
                    found: entry.prev_hash.clone(),
                });
            }
            // Continue from what the entry stored, so one corruption is
            // reported once rather than cascading down the stream.
            expected = entry_hash(entry);
        }
        Ok(breaks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn stream_in(dir: &tempfile::TempDir) -> LedgerStream {
        LedgerStream::open(dir.path().join("test.jsonl")).await.unwrap()
    }

    #[tokio::test]
    async fn first_entry_chains_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let stream = stream_in(&dir).await;
        stream
            .write(EntryDraft::new("EXCHANGE", "WO-1"))
            .await
            .unwrap();
        let entries = stream.read_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prev_hash, ZERO_HASH);
        assert!(entries[0].id.as_str().starts_with("LED-"));
    }

    #[tokio::test]
    async fn chain_links_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let stream = stream_in(&dir).await;
        for i in 0..5 {
            stream
                .write(EntryDraft::new("EXCHANGE", format!("WO-{i}")).decision("success"))
                .await
                .unwrap();
        }
        let breaks = stream.verify_chain().await.unwrap();
        assert!(breaks.is_empty(), "unexpected breaks: {breaks:?}");

        let entries = stream.read_all().await.unwrap();
        // Every non-first entry links to its predecessor.
        for pair in entries.windows(2) {
            assert_ne!(pair[1].prev_hash, ZERO_HASH);
        }
    }

    #[tokio::test]
    async fn tampering_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.jsonl");
        let stream = LedgerStream::open(&path).await.unwrap();
        for _ in 0..3 {
            stream
                .write(EntryDraft::new("EXCHANGE", "WO-1"))
                .await
                .unwrap();
        }
        // Flip the decision of the middle entry on disk.
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
        let mut middle: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        middle["decision"] = json!("tampered");
        lines[1] = serde_json::to_string(&middle).unwrap();
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let reopened = LedgerStream::open(&path).await.unwrap();
        let breaks = reopened.verify_chain().await.unwrap();
        assert_eq!(breaks.len(), 1);
        assert_eq!(breaks[0].index, 2);
    }

    #[tokio::test]
    async fn chain_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.jsonl");
        {
            let stream = LedgerStream::open(&path).await.unwrap();
            stream
                .write(EntryDraft::new("SESSION_START", "SES-1"))
                .await
                .unwrap();
        }
        let stream = LedgerStream::open(&path).await.unwrap();
        stream
            .write(EntryDraft::new("SESSION_END", "SES-1"))
            .await
            .unwrap();
        let breaks = stream.verify_chain().await.unwrap();
        assert!(breaks.is_empty());
    }

    #[tokio::test]
    async fn filters_by_submission_and_event_type() {
        let dir = tempfile::tempdir().unwrap();
        let stream = stream_in(&dir).await;
        stream
            .write(EntryDraft::new("WO_EXECUTING", "WO-1"))
            .await
            .unwrap();
        stream
            .write(EntryDraft::new("WO_COMPLETED", "WO-1"))
            .await
            .unwrap();
        stream
            .write(EntryDraft::new("WO_EXECUTING", "WO-2"))
            .await
            .unwrap();

        let for_wo1 = stream.read_by_submission("WO-1").await.unwrap();
        assert_eq!(for_wo1.len(), 2);
        let executing = stream.read_by_event_type("WO_EXECUTING").await.unwrap();
        assert_eq!(executing.len(), 2);
    }

    #[tokio::test]
    async fn pinned_timestamp_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let stream = stream_in(&dir).await;
        let ts = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        stream
            .write(EntryDraft::new("SIGNAL", "SES-1").at(ts))
            .await
            .unwrap();
        let entries = stream.read_all().await.unwrap();
        assert_eq!(entries[0].timestamp, ts);
    }

    #[tokio::test]
    async fn canonical_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let stream = stream_in(&dir).await;
        let id = stream
            .write(
                EntryDraft::new("EXCHANGE", "WO-9")
                    .decision("success")
                    .reason("routine")
                    .metadata(json!({"b": 1, "a": {"z": true, "m": [1, 2]}})),
            )
            .await
            .unwrap();
        let entries = stream.read_all().await.unwrap();
        let entry = entries.iter().find(|e| e.id == id).unwrap();
        assert_eq!(entry.metadata["a"]["m"][1], 2);
        // Canonicalization is stable across serialize/parse cycles.
        let v1 = canonical_json(&serde_json::to_value(entry).unwrap());
        let reparsed: LedgerEntry = serde_json::from_str(&serde_json::to_string(entry).unwrap()).unwrap();
        let v2 = canonical_json(&serde_json::to_value(&reparsed).unwrap());
        assert_eq!(v1, v2);
    }
}

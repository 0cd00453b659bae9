#![deny(missing_docs)]
//! # cortex-ledger — append-only, hash-chained audit streams
//!
//! Every tier of the kernel writes its events into one JSONL stream per
//! (tier, kind) pair. Entries are frozen at write time: never updated, never
//! deleted. Each entry stores the hash of its predecessor, so a stream can be
//! verified end to end by recomputing hashes sequentially.
//!
//! ## Hash rule
//!
//! ```text
//! h_i = sha256( canonical_json(entry_i minus prev_hash) || h_{i-1} )
//! ```
//!
//! `h_{i-1}` is exactly `entry_i.prev_hash`; the first entry uses sixty-four
//! zeros. Canonical JSON means sorted keys and no insignificant whitespace —
//! `serde_json::Value`'s map is BTreeMap-backed, so serializing through a
//! `Value` yields canonical bytes.
//!
//! ## Concurrency
//!
//! One writer per stream: every append holds the stream's async lock for the
//! full write-and-flush. Readers scan the file without the lock; JSONL lines
//! are only ever appended whole, so a concurrent reader sees a prefix.

pub mod entry;
pub mod event;
pub mod metadata;
pub mod stream;

pub use entry::{EntryDraft, LedgerEntry};
pub use metadata::Provenance;
pub use stream::{canonical_json, ChainBreak, LedgerError, LedgerStream, ZERO_HASH};

use std::path::Path;
use std::sync::Arc;

/// The five streams of a kernel instance, one writer each.
///
/// Directory layout under the root:
/// ```text
/// root/
///   hot/exchange.jsonl      gateway exchanges, budget events
///   ho1/ho1m.jsonl          executor trace
///   ho2/ho2m.jsonl          supervisor, session, quality gate
///   memory/signals.jsonl    signal events
///   memory/overlays.jsonl   overlay lifecycle events
/// ```
#[derive(Clone)]
pub struct Ledger {
    hot: Arc<LedgerStream>,
    ho1: Arc<LedgerStream>,
    ho2: Arc<LedgerStream>,
    signals: Arc<LedgerStream>,
    overlays: Arc<LedgerStream>,
}

impl Ledger {
    /// Open (or create) all five streams under the given root directory.
    pub async fn open(root: &Path) -> Result<Self, LedgerError> {
        Ok(Self {
            hot: Arc::new(LedgerStream::open(root.join("hot/exchange.jsonl")).await?),
            ho1: Arc::new(LedgerStream::open(root.join("ho1/ho1m.jsonl")).await?),
            ho2: Arc::new(LedgerStream::open(root.join("ho2/ho2m.jsonl")).await?),
            signals: Arc::new(LedgerStream::open(root.join("memory/signals.jsonl")).await?),
            overlays: Arc::new(LedgerStream::open(root.join("memory/overlays.jsonl")).await?),
        })
    }

    /// The gateway/budget stream (tier `hot`).
    pub fn hot(&self) -> Arc<LedgerStream> {
        Arc::clone(&self.hot)
    }

    /// The executor stream (tier `ho1`).
    pub fn ho1(&self) -> Arc<LedgerStream> {
        Arc::clone(&self.ho1)
    }

    /// The supervisor stream (tier `ho2`).
    pub fn ho2(&self) -> Arc<LedgerStream> {
        Arc::clone(&self.ho2)
    }

    /// The memory plane's signal stream.
    pub fn signals(&self) -> Arc<LedgerStream> {
        Arc::clone(&self.signals)
    }

    /// The memory plane's overlay stream.
    pub fn overlays(&self) -> Arc<LedgerStream> {
        Arc::clone(&self.overlays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryDraft;

    #[tokio::test]
    async fn ledger_opens_all_streams() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path()).await.unwrap();

        ledger
            .hot()
            .write(EntryDraft::new(event::EXCHANGE, "WO-1"))
            .await
            .unwrap();
        ledger
            .ho2()
            .write(EntryDraft::new(event::SESSION_START, "SES-1"))
            .await
            .unwrap();

        assert_eq!(ledger.hot().read_all().await.unwrap().len(), 1);
        assert_eq!(ledger.ho2().read_all().await.unwrap().len(), 1);
        assert!(ledger.ho1().read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn streams_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path()).await.unwrap();

        ledger
            .signals()
            .write(EntryDraft::new(event::SIGNAL, "SES-1"))
            .await
            .unwrap();

        assert!(ledger.overlays().read_all().await.unwrap().is_empty());
        assert_eq!(ledger.signals().read_all().await.unwrap().len(), 1);
    }
}

//! Ledger anchoring — periodic commitment of entry digests to an
//! external append-only ledger
//!
//! A background worker consumes digests from an mpsc channel and
//! submits one anchor transaction per digest, each carrying the
//! previously anchored digest so the ledger records a chain. Anchoring
//! is best-effort: a failed submission is logged and skipped, the chain
//! head stays at the last digest the ledger accepted.

pub mod http;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

/// Previous-digest value for the very first anchor
pub const GENESIS_ANCHOR: &str = "0x0";

/// Pending digests buffered while the ledger is slow; beyond this the
/// newest digests are dropped (never blocks the write path)
const ANCHOR_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger transport error: {0}")]
    Transport(String),

    #[error("Ledger rejected transaction: {0}")]
    Rejected(String),
}

/// One anchor transaction as submitted to the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorTx {
    pub digest: String,
    pub prev: String,
    pub nonce: u64,
}

/// External append-only ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Number of transactions already submitted by this account; seeds
    /// the nonce sequence
    async fn transaction_count(&self) -> Result<u64, LedgerError>;

    /// Digest of the ledger's current chain head, `None` when the
    /// ledger holds no anchors yet; seeds `prev` across restarts
    async fn last_anchor(&self) -> Result<Option<String>, LedgerError>;

    /// Submit one anchor transaction, returning the ledger's reference
    /// for it
    async fn submit(&self, tx: &AnchorTx) -> Result<String, LedgerError>;
}

/// Strictly increasing nonce sequence, lazily seeded from the ledger's
/// transaction count on first use
///
/// A nonce is consumed by allocation, not by acceptance: a digest whose
/// submission fails still used up its nonce.
pub struct NonceAllocator {
    client: Arc<dyn LedgerClient>,
    next: Mutex<Option<u64>>,
}

impl NonceAllocator {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            next: Mutex::new(None),
        }
    }

    pub async fn allocate(&self) -> Result<u64, LedgerError> {
        let mut next = self.next.lock().await;
        let nonce = match *next {
            Some(n) => n,
            None => self.client.transaction_count().await?,
        };
        *next = Some(nonce + 1);
        Ok(nonce)
    }
}

/// Handle held by the write path; hands digests to the worker without
/// ever blocking
#[derive(Clone)]
pub struct AnchorHandle {
    tx: mpsc::Sender<String>,
}

impl AnchorHandle {
    /// Queue a digest for anchoring. Lossy under backpressure: a full
    /// queue or stopped worker drops the digest with a warning.
    pub fn record(&self, digest: &str) {
        if let Err(e) = self.tx.try_send(digest.to_string()) {
            tracing::warn!("anchor queue unavailable, digest not anchored: {e}");
        }
    }
}

/// Background worker submitting anchor transactions one at a time
///
/// Consumes digests from an mpsc channel and exits when it closes.
/// The chain head is lazily seeded from the ledger on first use, so a
/// restarted process chains onto the anchors the ledger already holds.
pub struct AnchorWorker {
    client: Arc<dyn LedgerClient>,
    nonces: NonceAllocator,
    last_anchored: Option<String>,
}

impl AnchorWorker {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            nonces: NonceAllocator::new(client.clone()),
            client,
            last_anchored: None,
        }
    }

    /// Spawn the worker and return the handle the write path uses
    pub fn spawn(client: Arc<dyn LedgerClient>) -> AnchorHandle {
        let (tx, rx) = mpsc::channel(ANCHOR_QUEUE_CAPACITY);
        tokio::spawn(Self::new(client).run(rx));
        AnchorHandle { tx }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<String>) {
        tracing::info!("Ledger anchor worker started");

        while let Some(digest) = rx.recv().await {
            self.anchor(&digest).await;
        }

        tracing::info!("Anchor channel closed, worker stopping");
    }

    async fn anchor(&mut self, digest: &str) {
        let prev = match self.chain_head().await {
            Ok(prev) => prev,
            Err(e) => {
                tracing::warn!("could not read ledger chain head, digest not anchored: {e}");
                return;
            }
        };

        let nonce = match self.nonces.allocate().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("could not allocate nonce, digest not anchored: {e}");
                return;
            }
        };

        let tx = AnchorTx {
            digest: digest.to_string(),
            prev,
            nonce,
        };

        match self.client.submit(&tx).await {
            Ok(reference) => {
                self.last_anchored = Some(digest.to_string());
                tracing::info!(nonce, reference, "digest anchored");
            }
            Err(e) => {
                // Chain head unchanged; the nonce is spent regardless
                tracing::warn!(nonce, "anchor submission failed: {e}");
            }
        }
    }

    /// Previous digest for the next anchor: the last one this worker
    /// confirmed, else the ledger's existing chain head, else genesis.
    async fn chain_head(&mut self) -> Result<String, LedgerError> {
        if let Some(digest) = &self.last_anchored {
            return Ok(digest.clone());
        }
        match self.client.last_anchor().await? {
            Some(head) => {
                self.last_anchored = Some(head.clone());
                Ok(head)
            }
            None => Ok(GENESIS_ANCHOR.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct MockLedger {
        base_count: u64,
        existing_head: Option<String>,
        fail_next: AtomicBool,
        submitted: parking_lot::Mutex<Vec<AnchorTx>>,
    }

    #[async_trait]
    impl LedgerClient for MockLedger {
        async fn transaction_count(&self) -> Result<u64, LedgerError> {
            Ok(self.base_count)
        }

        async fn last_anchor(&self) -> Result<Option<String>, LedgerError> {
            Ok(self
                .submitted
                .lock()
                .last()
                .map(|tx| tx.digest.clone())
                .or_else(|| self.existing_head.clone()))
        }

        async fn submit(&self, tx: &AnchorTx) -> Result<String, LedgerError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(LedgerError::Transport("connection refused".into()));
            }
            let mut submitted = self.submitted.lock();
            submitted.push(tx.clone());
            Ok(format!("0xref{}", submitted.len()))
        }
    }

    #[tokio::test]
    async fn first_anchor_on_empty_ledger_uses_genesis() {
        let ledger = Arc::new(MockLedger::default());
        let mut worker = AnchorWorker::new(ledger.clone());

        worker.anchor("d1").await;

        let submitted = ledger.submitted.lock();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].prev, GENESIS_ANCHOR);
        assert_eq!(submitted[0].nonce, 0);
    }

    #[tokio::test]
    async fn restart_chains_onto_the_ledgers_existing_head() {
        // Ledger already holds anchors from a previous process life
        let ledger = Arc::new(MockLedger {
            base_count: 3,
            existing_head: Some("d-before-restart".into()),
            ..Default::default()
        });
        let mut worker = AnchorWorker::new(ledger.clone());

        worker.anchor("d-after-restart").await;
        worker.anchor("d-next").await;

        let submitted = ledger.submitted.lock();
        assert_eq!(submitted[0].prev, "d-before-restart");
        assert_eq!(submitted[0].nonce, 3);
        // Subsequent anchors chain locally, no re-query
        assert_eq!(submitted[1].prev, "d-after-restart");
    }

    #[tokio::test]
    async fn prev_chains_across_anchors() {
        let ledger = Arc::new(MockLedger::default());
        let mut worker = AnchorWorker::new(ledger.clone());

        worker.anchor("d1").await;
        worker.anchor("d2").await;
        worker.anchor("d3").await;

        let submitted = ledger.submitted.lock();
        assert_eq!(submitted[0].prev, GENESIS_ANCHOR);
        assert_eq!(submitted[1].prev, "d1");
        assert_eq!(submitted[2].prev, "d2");
        assert_eq!(submitted.iter().map(|t| t.nonce).collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[tokio::test]
    async fn failed_submission_keeps_chain_head_but_spends_nonce() {
        let ledger = Arc::new(MockLedger::default());
        let mut worker = AnchorWorker::new(ledger.clone());

        worker.anchor("d1").await;
        ledger.fail_next.store(true, Ordering::SeqCst);
        worker.anchor("d2").await; // lost
        worker.anchor("d3").await;

        let submitted = ledger.submitted.lock();
        assert_eq!(submitted.len(), 2);
        // d3 chains to d1, not to the never-anchored d2
        assert_eq!(submitted[1].digest, "d3");
        assert_eq!(submitted[1].prev, "d1");
        // d2's nonce is gone
        assert_eq!(submitted[1].nonce, 2);
    }

    #[tokio::test]
    async fn concurrent_allocations_never_reuse_a_nonce() {
        let ledger: Arc<dyn LedgerClient> = Arc::new(MockLedger {
            base_count: 100,
            ..Default::default()
        });
        let nonces = Arc::new(NonceAllocator::new(ledger));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let nonces = nonces.clone();
            handles.push(tokio::spawn(async move { nonces.allocate().await.unwrap() }));
        }

        let mut seen = Vec::new();
        for h in handles {
            seen.push(h.await.unwrap());
        }
        seen.sort_unstable();
        let expected: Vec<u64> = (100..132).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn worker_drains_channel_in_order() {
        let ledger = Arc::new(MockLedger::default());
        let (tx, rx) = mpsc::channel(8);
        let worker = AnchorWorker::new(ledger.clone());
        let task = tokio::spawn(worker.run(rx));

        for digest in ["a", "b", "c"] {
            tx.send(digest.to_string()).await.unwrap();
        }
        drop(tx);
        task.await.unwrap();

        let submitted = ledger.submitted.lock();
        assert_eq!(
            submitted.iter().map(|t| t.digest.as_str()).collect::<Vec<_>>(),
            ["a", "b", "c"]
        );
    }
}

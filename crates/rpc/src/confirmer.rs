// Path: crates/rpc/src/confirmer.rs
//! The background sweep that walks pending transactions toward
//! `Confirmed`.
//!
//! Each pass loads the not-yet-confirmed transactions inside the retention
//! window, asks the Darknodes for their status, and on `done` pushes the
//! finalized form back through the checker (a no-op insert thanks to
//! dedup) before flipping the stored status. A failed pass leaves
//! everything untouched; the next tick retries.

use crate::cacher::Cacher;
use crate::checker::TxChecker;
use crate::jsonrpc::methods;
use lightnode_api::storage::TxStore;
use lightnode_types::tx::{Transaction, TxStatus};
use serde_json::{json, Value as Json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// The pending-transaction confirmer.
pub struct Confirmer {
    store: Arc<dyn TxStore>,
    cacher: Arc<Cacher>,
    checker: TxChecker,
    interval: Duration,
    max_age: Duration,
}

impl Confirmer {
    /// Builds a confirmer sweeping every `interval` over transactions no
    /// older than `max_age`.
    pub fn new(
        store: Arc<dyn TxStore>,
        cacher: Arc<Cacher>,
        checker: TxChecker,
        interval: Duration,
        max_age: Duration,
    ) -> Self {
        Self { store, cacher, checker, interval, max_age }
    }

    /// Runs the sweep loop until `shutdown` fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep().await,
                _ = shutdown.changed() => {
                    tracing::info!(target: "confirmer", "shutting down");
                    break;
                }
            }
        }
    }

    /// One sweep over the pending set.
    pub async fn sweep(&self) {
        let pending = match self.store.pending(self.max_age) {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(target: "confirmer", error = %e, "failed to load pending transactions");
                return;
            }
        };
        for tx in pending {
            let hash = tx.hash;
            let result = match self
                .cacher
                .call(methods::QUERY_TX, json!({ "txHash": hash.to_string() }), "")
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::debug!(target: "confirmer", %hash, error = %e, "status query failed");
                    continue;
                }
            };
            if result.get("txStatus").and_then(Json::as_str) != Some("done") {
                continue;
            }
            // Push the finalized form (output included) back through the
            // pipeline; dedup absorbs the re-insert.
            if let Some(tx_json) = result.get("tx") {
                match Transaction::from_json(tx_json) {
                    Ok(final_tx) => {
                        if let Err(e) = self.checker.submit(final_tx).await {
                            tracing::debug!(target: "confirmer", %hash, error = %e.message, "final submit refused");
                        }
                    }
                    Err(e) => {
                        tracing::debug!(target: "confirmer", %hash, error = %e, "unparseable final tx");
                    }
                }
            }
            if let Err(e) = self.store.update_status(&hash, TxStatus::Confirmed) {
                tracing::warn!(target: "confirmer", %hash, error = %e, "failed to confirm");
            } else {
                tracing::info!(target: "confirmer", %hash, "confirmed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::Verifier;
    use async_trait::async_trait;
    use lightnode_api::darknode::{DarknodeCaller, DarknodeError};
    use lightnode_storage::RedbTxStore;
    use lightnode_types::selector::Selector;
    use lightnode_types::tx::{LockMintBurnReleaseInput, Version};
    use primitive_types::U256;

    struct AcceptAll;

    #[async_trait]
    impl Verifier for AcceptAll {
        async fn verify(&self, _tx: &Transaction) -> Result<(), String> {
            Ok(())
        }
    }

    struct DoneFor {
        done: String,
    }

    #[async_trait]
    impl DarknodeCaller for DoneFor {
        async fn call(&self, _method: &str, params: Json) -> Result<Json, DarknodeError> {
            let queried = params["txHash"].as_str().unwrap_or("").to_string();
            if queried == self.done {
                Ok(json!({ "tx": { "hash": queried }, "txStatus": "done" }))
            } else {
                Ok(json!({ "txStatus": "confirming" }))
            }
        }
    }

    fn tx(n: u8) -> Transaction {
        let nonce = [n; 32];
        let payload = Vec::new();
        let txid = vec![n; 32];
        let input = LockMintBurnReleaseInput {
            phash: lightnode_types::hash::phash(&payload),
            nhash: lightnode_types::hash::nhash(&nonce, &txid, 0),
            txid,
            txindex: 0,
            amount: U256::from(1u64),
            payload,
            to: "miMi2VET41YV1j6SDNTeZoPBbmH8B4nEx6".to_string(),
            nonce,
            gpubkey: Vec::new(),
            ghash: [n; 32],
        };
        Transaction::new(Version::V1, Selector::new("BTC/fromEthereum").unwrap(), input).unwrap()
    }

    #[tokio::test]
    async fn sweep_confirms_done_and_leaves_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RedbTxStore::open(dir.path().join("txs.redb")).unwrap());
        let done_tx = tx(1);
        let pending_tx = tx(2);
        store.insert(&done_tx).unwrap();
        store.insert(&pending_tx).unwrap();

        let cacher = Cacher::new(
            Arc::new(DoneFor { done: done_tx.hash.to_string() }),
            Duration::from_secs(60),
        );
        let checker = TxChecker::new(Arc::new(AcceptAll), store.clone());
        let confirmer = Confirmer::new(
            store.clone(),
            cacher,
            checker,
            Duration::from_secs(30),
            Duration::from_secs(3600),
        );
        confirmer.sweep().await;

        assert_eq!(store.status(&done_tx.hash).unwrap(), TxStatus::Confirmed);
        assert_eq!(store.status(&pending_tx.hash).unwrap(), TxStatus::Confirming);
        // A second sweep sees only the still-pending transaction.
        assert_eq!(store.pending(Duration::from_secs(3600)).unwrap().len(), 1);
    }
}

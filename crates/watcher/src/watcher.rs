// Path: crates/watcher/src/watcher.rs
//! The generic burn-watcher poll loop.

use async_trait::async_trait;
use lightnode_api::chain::AddressCodecRegistry;
use lightnode_api::fetcher::{BurnLogFetcher, EventInfo};
use lightnode_api::storage::{KvStore, StorageError};
use lightnode_compat::hash::{burn_tx_hash, to_from_v1_selector};
use lightnode_compat::store::CompatStore;
use lightnode_types::selector::Selector;
use lightnode_types::tx::{LockMintBurnReleaseInput, Transaction, Version};
use primitive_types::U256;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// The seam through which synthesized transactions enter the resolver
/// pipeline. The node implements this over the tx checker.
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    /// Submits a synthesized transaction; an `Err` leaves the cursor
    /// unchanged so the tick retries.
    async fn submit_tx(&self, tx: Transaction) -> Result<(), String>;
}

/// Per-watcher tuning.
#[derive(Clone, Debug)]
pub struct WatcherConfig {
    /// Seconds between polls.
    pub poll_interval: Duration,
    /// Blocks below the tip treated as not yet safe. Zero for chains with
    /// single-slot finality.
    pub confidence_interval: u64,
    /// Maximum blocks one tick may advance.
    pub max_block_advance: u64,
}

/// One burn-event poller for one `(chain, asset)` pair.
pub struct Watcher {
    selector: Selector,
    config: WatcherConfig,
    fetcher: Arc<dyn BurnLogFetcher>,
    cursor: Arc<dyn KvStore>,
    compat: Arc<CompatStore>,
    codecs: Arc<AddressCodecRegistry>,
    submitter: Arc<dyn TxSubmitter>,
}

impl Watcher {
    /// Builds a watcher. `cursor` is the shared cache; the cursor key is
    /// `"<selector>_lastCheckedBlock"`, written with no TTL.
    pub fn new(
        selector: Selector,
        config: WatcherConfig,
        fetcher: Arc<dyn BurnLogFetcher>,
        cursor: Arc<dyn KvStore>,
        compat: Arc<CompatStore>,
        codecs: Arc<AddressCodecRegistry>,
        submitter: Arc<dyn TxSubmitter>,
    ) -> Self {
        Self { selector, config, fetcher, cursor, compat, codecs, submitter }
    }

    fn cursor_key(&self) -> String {
        format!("{}_lastCheckedBlock", self.selector)
    }

    fn load_cursor(&self) -> Result<Option<u64>, StorageError> {
        match self.cursor.get(&self.cursor_key()) {
            Ok(bytes) => {
                let s = String::from_utf8_lossy(&bytes);
                Ok(Some(s.parse::<u64>().map_err(|e| StorageError::Decode(e.to_string()))?))
            }
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn store_cursor(&self, height: u64) -> Result<(), StorageError> {
        // No TTL: the cursor outlives every mapping.
        self.cursor.set(&self.cursor_key(), height.to_string().into_bytes(), None)
    }

    /// Runs the poll loop until `shutdown` fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(target: "watcher", selector = %self.selector, "watcher started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // One poll interval is also the tick deadline; a hung
                    // chain client must not wedge the loop.
                    match tokio::time::timeout(self.config.poll_interval, self.tick()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(target: "watcher", selector = %self.selector, error = %e, "tick failed");
                        }
                        Err(_) => {
                            tracing::warn!(target: "watcher", selector = %self.selector, "tick timed out");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!(target: "watcher", selector = %self.selector, "shutting down");
                    break;
                }
            }
        }
    }

    /// One poll: fetch new burn events and submit them, advancing the
    /// cursor only when every event went through.
    pub async fn tick(&self) -> Result<(), String> {
        let current = self.fetcher.latest_block_height().await.map_err(|e| e.to_string())?;
        let last = match self.load_cursor().map_err(|e| e.to_string())? {
            Some(last) => last,
            None => {
                // First tick: start from the present, never backfill.
                self.store_cursor(current).map_err(|e| e.to_string())?;
                return Ok(());
            }
        };
        if current <= last {
            // The chain rewound or stalled; never regress.
            return Ok(());
        }
        let to = last
            .saturating_add(self.config.max_block_advance)
            .min(current)
            .saturating_sub(self.config.confidence_interval);
        if to <= last {
            return Ok(());
        }

        let events =
            self.fetcher.fetch_burn_logs(last, to).await.map_err(|e| e.to_string())?;
        for event in events {
            match self.synthesize(&event) {
                Ok(tx) => {
                    let burn_ref = U256::from_big_endian(&event.nonce);
                    let contract =
                        to_from_v1_selector(&self.selector).map_err(|e| e.to_string())?;
                    let v0_hash = burn_tx_hash(&contract, burn_ref);
                    self.compat
                        .persist_burn_event(self.selector.as_str(), burn_ref, &v0_hash, &tx.hash)
                        .map_err(|e| e.to_string())?;
                    // A failed submit aborts the tick without advancing the
                    // cursor; the next tick retries and dedup absorbs the
                    // repeats.
                    self.submitter.submit_tx(tx).await?;
                }
                Err(reason) => {
                    tracing::warn!(
                        target: "watcher",
                        selector = %self.selector,
                        block = event.block_number,
                        reason,
                        "skipping undecodable burn event"
                    );
                }
            }
        }
        self.store_cursor(to).map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Synthesizes the v1 release transaction for one burn event.
    fn synthesize(&self, event: &EventInfo) -> Result<Transaction, String> {
        if event.target_chain != self.selector.destination() {
            return Err(format!(
                "event targets {}, watcher releases on {}",
                event.target_chain,
                self.selector.destination()
            ));
        }
        // The recipient bytes are normally the address string itself; the
        // legacy SDK path emitted base58 that no codec accepts directly.
        let as_string = String::from_utf8_lossy(&event.to_bytes).to_string();
        let (to, decoded, version) =
            match self.codecs.decode(self.selector.destination(), &as_string) {
                Ok(decoded) => (as_string, decoded, Version::V1),
                Err(_) => {
                    let decoded = bs58::decode(as_string.as_bytes())
                        .into_vec()
                        .map_err(|e| format!("recipient decodes neither natively nor as base58: {e}"))?;
                    if decoded.is_empty() {
                        return Err("empty recipient".to_string());
                    }
                    (as_string, decoded, Version::V0)
                }
            };

        let payload = Vec::new();
        let phash = lightnode_types::hash::phash(&payload);
        let nhash = lightnode_types::hash::nhash(&event.nonce, &event.txid, 0);
        let ghash = lightnode_types::hash::ghash(&self.selector, &phash, &decoded, &event.nonce);
        let input = LockMintBurnReleaseInput {
            txid: event.txid.clone(),
            txindex: 0,
            amount: event.amount,
            payload,
            phash,
            to,
            nonce: event.nonce,
            nhash,
            // Burns do not carry a shard key.
            gpubkey: Vec::new(),
            ghash,
        };
        Transaction::new(version, self.selector.clone(), input).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightnode_api::chain::{AddressEncodeDecoder, ChainClientError};
    use lightnode_api::fetcher::FetcherError;
    use lightnode_api::storage::TxStore as _;
    use lightnode_storage::{MemKv, RedbTxStore};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct Base58Codec;

    impl AddressEncodeDecoder for Base58Codec {
        fn decode_address(&self, addr: &str) -> Result<Vec<u8>, ChainClientError> {
            bs58::decode(addr).into_vec().map_err(|e| ChainClientError::AddressCodec {
                chain: "Bitcoin".to_string(),
                msg: e.to_string(),
            })
        }

        fn encode_address(&self, raw: &[u8]) -> Result<String, ChainClientError> {
            Ok(bs58::encode(raw).into_string())
        }
    }

    struct ScriptedFetcher {
        height: AtomicU64,
        events: Mutex<Vec<EventInfo>>,
    }

    #[async_trait]
    impl BurnLogFetcher for ScriptedFetcher {
        async fn latest_block_height(&self) -> Result<u64, FetcherError> {
            Ok(self.height.load(Ordering::SeqCst))
        }

        async fn fetch_burn_logs(
            &self,
            _from: u64,
            _to: u64,
        ) -> Result<Vec<EventInfo>, FetcherError> {
            Ok(self.events.lock().unwrap().clone())
        }
    }

    struct Recorder {
        submitted: Mutex<Vec<Transaction>>,
        fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl TxSubmitter for Recorder {
        async fn submit_tx(&self, tx: Transaction) -> Result<(), String> {
            if self.fail.load(Ordering::SeqCst) {
                return Err("pipeline refused".to_string());
            }
            self.submitted.lock().unwrap().push(tx);
            Ok(())
        }
    }

    struct Env {
        _dir: tempfile::TempDir,
        watcher: Watcher,
        kv: Arc<MemKv>,
        compat: Arc<CompatStore>,
        fetcher: Arc<ScriptedFetcher>,
        recorder: Arc<Recorder>,
    }

    fn burn_event(nonce_ref: u64, amount: u64) -> EventInfo {
        let mut nonce = [0u8; 32];
        nonce[24..].copy_from_slice(&nonce_ref.to_be_bytes());
        EventInfo {
            asset: "BTC".to_string(),
            target_chain: "Bitcoin".to_string(),
            txid: vec![0x77u8; 32],
            amount: U256::from(amount),
            to_bytes: b"miMi2VET41YV1j6SDNTeZoPBbmH8B4nEx6".to_vec(),
            nonce,
            block_number: 5,
        }
    }

    fn env(confidence: u64) -> Env {
        let dir = tempfile::tempdir().unwrap();
        let txs = Arc::new(RedbTxStore::open(dir.path().join("txs.redb")).unwrap());
        let kv = Arc::new(MemKv::new());
        let compat = Arc::new(CompatStore::new(
            kv.clone(),
            txs.clone(),
            Duration::from_secs(3600),
        ));
        let mut codecs = AddressCodecRegistry::new();
        codecs.register("Bitcoin", Arc::new(Base58Codec));
        let fetcher = Arc::new(ScriptedFetcher {
            height: AtomicU64::new(100),
            events: Mutex::new(vec![]),
        });
        let recorder = Arc::new(Recorder {
            submitted: Mutex::new(vec![]),
            fail: std::sync::atomic::AtomicBool::new(false),
        });
        let watcher = Watcher::new(
            Selector::new("BTC/fromEthereum").unwrap(),
            WatcherConfig {
                poll_interval: Duration::from_secs(15),
                confidence_interval: confidence,
                max_block_advance: 1000,
            },
            fetcher.clone(),
            kv.clone(),
            compat.clone(),
            Arc::new(codecs),
            recorder.clone(),
        );
        // Silence the unused warning on the tx store handle kept alive by
        // the compat store.
        let _ = txs.page(0, 1);
        Env { _dir: dir, watcher, kv, compat, fetcher, recorder }
    }

    #[tokio::test]
    async fn first_tick_initialises_cursor_and_skips() {
        let env = env(6);
        env.watcher.tick().await.unwrap();
        assert_eq!(
            env.kv.get("BTC/fromEthereum_lastCheckedBlock").unwrap(),
            b"100"
        );
        assert!(env.recorder.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn burn_event_is_synthesized_mapped_and_submitted() {
        let env = env(6);
        env.watcher.tick().await.unwrap(); // cursor = 100
        env.fetcher.height.store(150, Ordering::SeqCst);
        *env.fetcher.events.lock().unwrap() = vec![burn_event(0, 10_000)];

        env.watcher.tick().await.unwrap();

        // The resolver was called exactly once.
        let submitted = env.recorder.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        let tx = &submitted[0];
        assert_eq!(tx.version, Version::V1);
        assert_eq!(tx.selector.as_str(), "BTC/fromEthereum");
        assert_eq!(tx.input.amount, U256::from(10_000u64));
        assert!(tx.input.gpubkey.is_empty());
        assert_eq!(tx.input.to, "miMi2VET41YV1j6SDNTeZoPBbmH8B4nEx6");

        // The cache now maps "BTC/fromEthereum_0" to the v0 burn hash.
        let v0_hash = burn_tx_hash("BTC0Eth2Btc", U256::zero());
        assert_eq!(env.kv.get("BTC/fromEthereum_0").unwrap(), v0_hash.to_vec());
        assert_eq!(env.compat.get_v1_hash_from_hash(&v0_hash).unwrap(), tx.hash);

        // Cursor advanced to min(last+advance, current) - confidence.
        assert_eq!(
            env.kv.get("BTC/fromEthereum_lastCheckedBlock").unwrap(),
            b"144"
        );
    }

    #[tokio::test]
    async fn failed_submission_leaves_cursor_for_retry() {
        let env = env(0);
        env.watcher.tick().await.unwrap(); // cursor = 100
        env.fetcher.height.store(120, Ordering::SeqCst);
        *env.fetcher.events.lock().unwrap() = vec![burn_event(1, 500)];
        env.recorder.fail.store(true, Ordering::SeqCst);

        assert!(env.watcher.tick().await.is_err());
        assert_eq!(
            env.kv.get("BTC/fromEthereum_lastCheckedBlock").unwrap(),
            b"100"
        );

        // Once the pipeline recovers, the same tick range goes through.
        env.recorder.fail.store(false, Ordering::SeqCst);
        env.watcher.tick().await.unwrap();
        assert_eq!(env.recorder.submitted.lock().unwrap().len(), 1);
        assert_eq!(
            env.kv.get("BTC/fromEthereum_lastCheckedBlock").unwrap(),
            b"120"
        );
    }

    #[tokio::test]
    async fn cursor_never_regresses() {
        let env = env(0);
        env.watcher.tick().await.unwrap(); // cursor = 100
        env.fetcher.height.store(90, Ordering::SeqCst);
        env.watcher.tick().await.unwrap();
        assert_eq!(
            env.kv.get("BTC/fromEthereum_lastCheckedBlock").unwrap(),
            b"100"
        );
    }

    #[tokio::test]
    async fn events_for_other_chains_are_skipped() {
        let env = env(0);
        env.watcher.tick().await.unwrap();
        env.fetcher.height.store(120, Ordering::SeqCst);
        let mut event = burn_event(2, 500);
        event.target_chain = "Zcash".to_string();
        *env.fetcher.events.lock().unwrap() = vec![event];

        env.watcher.tick().await.unwrap();
        assert!(env.recorder.submitted.lock().unwrap().is_empty());
        // The cursor still advances past undecodable events.
        assert_eq!(
            env.kv.get("BTC/fromEthereum_lastCheckedBlock").unwrap(),
            b"120"
        );
    }

    #[tokio::test]
    async fn legacy_base58_recipient_downgrades_version() {
        let env = env(0);
        env.watcher.tick().await.unwrap();
        env.fetcher.height.store(120, Ordering::SeqCst);
        *env.fetcher.events.lock().unwrap() = vec![burn_event(3, 700)];
        // Drop the codec: decode fails, the base58 fallback fires.
        let mut codecs = AddressCodecRegistry::new();
        codecs.register("Dogecoin", Arc::new(Base58Codec));
        let watcher = Watcher::new(
            env.watcher.selector.clone(),
            env.watcher.config.clone(),
            env.fetcher.clone(),
            env.kv.clone(),
            env.compat.clone(),
            Arc::new(codecs),
            env.recorder.clone(),
        );
        watcher.tick().await.unwrap();
        let submitted = env.recorder.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].version, Version::V0);
    }
}

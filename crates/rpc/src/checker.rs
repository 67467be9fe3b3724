// Path: crates/rpc/src/checker.rs
//! The deep-semantic transaction checker.
//!
//! Submissions arrive on a bounded channel and are verified by a worker
//! pool (2 × the available parallelism) running the same chain-side
//! validation the Darknodes will run, under a ten-second deadline.
//! Verified transactions are deduplicated by hash under a process-local
//! mutex before insertion, so a re-submission races to a success, never a
//! duplicate row.

use crate::jsonrpc::ErrorObject;
use async_trait::async_trait;
use lightnode_api::storage::{StorageError, TxStore};
use lightnode_compat::translate::Bindings;
use lightnode_types::tx::{Transaction, TxHash, Version};
use ripemd::Ripemd160;
use sha2::Digest as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};

/// Queue capacity between the resolver and the workers.
const CHECK_QUEUE: usize = 128;
/// Deadline for one verification.
const VERIFY_DEADLINE: Duration = Duration::from_secs(10);

/// The verification strategy. Swapped out in tests and for networks whose
/// chain clients are not wired up.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Verifies a submission the way the Darknodes will; an `Err` is the
    /// rejection text surfaced to the client.
    async fn verify(&self, tx: &Transaction) -> Result<(), String>;
}

struct CheckJob {
    tx: Transaction,
    respond: oneshot::Sender<Result<TxHash, ErrorObject>>,
}

/// The checker front end handed to the resolver.
#[derive(Clone)]
pub struct TxChecker {
    queue: mpsc::Sender<CheckJob>,
}

impl TxChecker {
    /// Spawns the worker pool and returns the submission handle.
    pub fn new(verifier: Arc<dyn Verifier>, store: Arc<dyn TxStore>) -> Self {
        let (queue, rx) = mpsc::channel::<CheckJob>(CHECK_QUEUE);
        let rx = Arc::new(Mutex::new(rx));
        let dedup = Arc::new(Mutex::new(()));
        let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4) * 2;
        for _ in 0..workers {
            let rx = rx.clone();
            let verifier = verifier.clone();
            let store = store.clone();
            let dedup = dedup.clone();
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    let outcome = check_one(&*verifier, &*store, &dedup, &job.tx).await;
                    let _ = job.respond.send(outcome);
                }
            });
        }
        Self { queue }
    }

    /// Submits a transaction for verification and persistence, returning
    /// its hash once stored (or already present).
    pub async fn submit(&self, tx: Transaction) -> Result<TxHash, ErrorObject> {
        let (respond, rx) = oneshot::channel();
        self.queue
            .try_send(CheckJob { tx, respond })
            .map_err(|_| ErrorObject::internal("too much back pressure"))?;
        rx.await.map_err(|_| ErrorObject::internal("checker worker dropped the request"))?
    }
}

async fn check_one(
    verifier: &dyn Verifier,
    store: &dyn TxStore,
    dedup: &Mutex<()>,
    tx: &Transaction,
) -> Result<TxHash, ErrorObject> {
    match tokio::time::timeout(VERIFY_DEADLINE, verifier.verify(tx)).await {
        Err(_) => return Err(ErrorObject::internal("verification timed out")),
        Ok(Err(reason)) => return Err(ErrorObject::invalid_params(reason)),
        Ok(Ok(())) => {}
    }
    // Read-then-insert must be atomic across workers.
    let _guard = dedup.lock().await;
    match store.get(&tx.hash) {
        Ok(_) => Ok(tx.hash),
        Err(StorageError::NotFound) => match store.insert(tx) {
            Ok(()) => Ok(tx.hash),
            // Lost a race against another process writing the same store.
            Err(StorageError::DuplicateTx(hash)) => Ok(hash),
            Err(e) => Err(ErrorObject::internal(e.to_string())),
        },
        Err(e) => Err(ErrorObject::internal(e.to_string())),
    }
}

fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = sha2::Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// The standard gateway script for a deposit: the gateway hash pinned in
/// front of a plain pay-to-pubkey-hash spend by the shard key.
fn gateway_script(gpubkey: &[u8], ghash: &[u8; 32]) -> Vec<u8> {
    let mut script = Vec::with_capacity(32 + 25 + 4);
    script.push(0x20); // push 32
    script.extend_from_slice(ghash);
    script.push(0x75); // OP_DROP
    script.push(0x76); // OP_DUP
    script.push(0xa9); // OP_HASH160
    script.push(0x14); // push 20
    script.extend_from_slice(&hash160(gpubkey));
    script.push(0x88); // OP_EQUALVERIFY
    script.push(0xac); // OP_CHECKSIG
    script
}

/// The pay-to-script-hash form the deposit output must carry.
fn gateway_pubkey_script(gpubkey: &[u8], ghash: &[u8; 32]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.push(0xa9); // OP_HASH160
    script.push(0x14); // push 20
    script.extend_from_slice(&hash160(&gateway_script(gpubkey, ghash)));
    script.push(0x87); // OP_EQUAL
    script
}

/// The production verifier: recomputes every fingerprint and, for locks,
/// checks the deposit on the source chain against the derived gateway.
pub struct DefaultVerifier {
    bindings: Arc<Bindings>,
    shard_pubkey: Vec<u8>,
}

impl DefaultVerifier {
    /// Builds the verifier over the chain bindings and the active shard
    /// public key.
    pub fn new(bindings: Arc<Bindings>, shard_pubkey: Vec<u8>) -> Self {
        Self { bindings, shard_pubkey }
    }
}

#[async_trait]
impl Verifier for DefaultVerifier {
    async fn verify(&self, tx: &Transaction) -> Result<(), String> {
        tx.input.check_derived_hashes().map_err(|e| e.to_string())?;

        // ghash is only recomputable with the v1 recipe for native
        // submissions; translated v0 transactions carry the legacy-recipe
        // value by construction.
        if tx.version == Version::V1 {
            if let Ok(raw) =
                self.bindings.codecs.decode(tx.selector.destination(), &tx.input.to)
            {
                let expect = lightnode_types::hash::ghash(
                    &tx.selector,
                    &tx.input.phash,
                    &raw,
                    &tx.input.nonce,
                );
                if expect != tx.input.ghash {
                    return Err("ghash does not match the value derived from the transaction input"
                        .to_string());
                }
            }
        }

        if tx.selector.is_lock() {
            if tx.input.gpubkey != self.shard_pubkey {
                return Err("gpubkey does not match the active shard".to_string());
            }
            let client = self
                .bindings
                .utxo_client(tx.selector.source())
                .map_err(|e| e.to_string())?;
            let output = client
                .output(&tx.input.txid, tx.input.txindex)
                .await
                .map_err(|e| e.to_string())?;
            if output.amount != tx.input.amount {
                return Err(format!(
                    "deposit amount {} does not match submitted amount {}",
                    output.amount, tx.input.amount
                ));
            }
            let expect = gateway_pubkey_script(&tx.input.gpubkey, &tx.input.ghash);
            if !output.pubkey_script.is_empty() && output.pubkey_script != expect {
                return Err("deposit script does not pay the derived gateway".to_string());
            }
        }
        Ok(())
    }
}

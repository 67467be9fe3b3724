// Path: crates/compat/src/store.rs
//! The persistent bidirectional v0↔v1 mapping store.
//!
//! Backed by the shared TTL cache plus the durable transaction store. Keys
//! are ASCII-safe strings: v0 hashes render in their standard base64
//! encoding, v1 hashes in base64-URL without padding, and the reader
//! accepts either on the way in. All mappings share the transaction prune
//! window as their TTL, except watcher cursors which are written by the
//! watcher crate with no expiry.

use crate::error::CompatError;
use crate::hash::{burn_tx_hash, to_from_v1_selector};
use crate::v0::V0Tx;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use lightnode_api::storage::{KvStore, StorageError, TxStore};
use lightnode_types::tx::{Transaction, TxHash};
use lightnode_types::value::Value;
use primitive_types::U256;
use std::sync::Arc;
use std::time::Duration;

/// The key under which a lock UTXO maps to its v1 hash:
/// `base64std(txHash-v0-order) + "_" + vout`.
pub fn utxo_key(tx_hash_v0: &[u8; 32], v_out: u32) -> String {
    format!("{}_{}", B64.encode(tx_hash_v0), v_out)
}

/// The key caching the amount of a lock UTXO.
pub fn amount_key(tx_hash_v0: &[u8; 32], v_out: u32) -> String {
    format!("amount_{}", utxo_key(tx_hash_v0, v_out))
}

/// The key preserving the original v0 payload of a lock submission.
pub fn payload_key(tx_hash_v0: &[u8; 32], v_out: u32) -> String {
    format!("payload_{}", utxo_key(tx_hash_v0, v_out))
}

/// The key under which a burn ref maps forward:
/// `<selector>_<ref-decimal>`.
pub fn ref_key(selector: &str, burn_ref: U256) -> String {
    format!("{selector}_{burn_ref}")
}

fn v0_hash_key(hash: &[u8; 32]) -> String {
    B64.encode(hash)
}

fn hash_from_value(bytes: &[u8]) -> Result<TxHash, CompatError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CompatError::Corrupt(format!("mapping value has {} bytes", bytes.len())))?;
    Ok(TxHash(arr))
}

/// The compat mapping store.
#[derive(Clone)]
pub struct CompatStore {
    kv: Arc<dyn KvStore>,
    txs: Arc<dyn TxStore>,
    ttl: Duration,
}

impl CompatStore {
    /// Creates a store over the shared cache and transaction store. `ttl`
    /// is the transaction prune window; mappings live exactly as long as
    /// the transactions they point at.
    pub fn new(kv: Arc<dyn KvStore>, txs: Arc<dyn TxStore>, ttl: Duration) -> Self {
        Self { kv, txs, ttl }
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CompatError> {
        self.kv.set(key, value, Some(self.ttl))?;
        Ok(())
    }

    /// Persists the mappings for a translated v0 submission. For locks
    /// this is `v0hash → v1hash`, `utxoKey → v1hash`, the cached amount,
    /// and the verbatim v0 payload; for burns it is `v0hash → v1hash` and
    /// `refKey → v1hash`.
    pub fn persist_mappings(&self, v0tx: &V0Tx, v1tx: &Transaction) -> Result<(), CompatError> {
        self.set(&v0_hash_key(&v0tx.hash), v1tx.hash.0.to_vec())?;
        if v1tx.selector.is_lock() {
            let utxo = match v0tx.arg("utxo").map(|a| &a.value) {
                Some(Value::BtcUtxo(u)) => u.clone(),
                _ => return Err(CompatError::Abi("lock tx missing utxo argument".to_string())),
            };
            self.set(&utxo_key(&utxo.tx_hash, utxo.v_out), v1tx.hash.0.to_vec())?;
            self.set(
                &amount_key(&utxo.tx_hash, utxo.v_out),
                v1tx.input.amount.to_string().into_bytes(),
            )?;
            if let Some(Value::EthPayload(p)) = v0tx.arg("p").map(|a| &a.value) {
                let payload_json = serde_json::to_vec(&crate::v0::value_to_v0_json(
                    &Value::EthPayload(p.clone()),
                ))
                .map_err(|e| CompatError::Corrupt(e.to_string()))?;
                self.set(&payload_key(&utxo.tx_hash, utxo.v_out), payload_json)?;
            }
        } else {
            let burn_ref = U256::from_big_endian(&v1tx.input.nonce);
            self.set(
                &ref_key(v1tx.selector.as_str(), burn_ref),
                v1tx.hash.0.to_vec(),
            )?;
        }
        Ok(())
    }

    /// Persists the mappings for a burn event observed by the watcher:
    /// `v0BurnHash → v1Hash` and `refKey → v0BurnHash`.
    pub fn persist_burn_event(
        &self,
        selector: &str,
        burn_ref: U256,
        v0_hash: &[u8; 32],
        v1_hash: &TxHash,
    ) -> Result<(), CompatError> {
        self.set(&v0_hash_key(v0_hash), v1_hash.0.to_vec())?;
        self.set(&ref_key(selector, burn_ref), v0_hash.to_vec())?;
        Ok(())
    }

    /// Resolves a v0 hash to its v1 hash.
    pub fn get_v1_hash_from_hash(&self, v0_hash: &[u8; 32]) -> Result<TxHash, CompatError> {
        match self.kv.get(&v0_hash_key(v0_hash)) {
            Ok(bytes) => hash_from_value(&bytes),
            Err(StorageError::NotFound) => Err(CompatError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolves a hash string in either base64 encoding. Tried as a v1
    /// hash first (it may be one already); then as a v0 hash mapping.
    pub fn resolve_hash_str(&self, s: &str) -> Result<TxHash, CompatError> {
        let hash = TxHash::from_b64(s)?;
        match self.txs.get(&hash) {
            Ok(_) => return Ok(hash),
            Err(StorageError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        self.get_v1_hash_from_hash(&hash.0)
    }

    /// Recovers the v1 transaction a v0 submission was translated into.
    /// Locks resolve via the UTXO key (the v0 hash is unknown until after
    /// translation); burns resolve via the ref key.
    pub fn get_v1_tx_from_tx(&self, v0tx: &V0Tx) -> Result<Transaction, CompatError> {
        let selector = crate::hash::selector_from_contract(&v0tx.to)?;
        let key = if selector.is_lock() {
            match v0tx.arg("utxo").map(|a| &a.value) {
                Some(Value::BtcUtxo(u)) => utxo_key(&u.tx_hash, u.v_out),
                _ => return Err(CompatError::Abi("lock tx missing utxo argument".to_string())),
            }
        } else {
            let burn_ref = match v0tx.arg("ref").map(|a| &a.value) {
                Some(Value::U256(r)) => *r,
                Some(Value::U64(r)) => U256::from(*r),
                _ => return Err(CompatError::Abi("burn tx missing ref argument".to_string())),
            };
            ref_key(selector.as_str(), burn_ref)
        };
        let mapped = match self.kv.get(&key) {
            Ok(bytes) => hash_from_value(&bytes)?,
            Err(StorageError::NotFound) => return Err(CompatError::NotFound),
            Err(e) => return Err(e.into()),
        };
        // The value may be a v1 hash (submit-side mapping) or a v0 burn
        // hash (watcher-side mapping); chase one extra hop in the latter
        // case.
        match self.txs.get(&mapped) {
            Ok(tx) => Ok(tx),
            Err(StorageError::NotFound) => {
                let v1 = self.get_v1_hash_from_hash(&mapped.0)?;
                match self.txs.get(&v1) {
                    Ok(tx) => Ok(tx),
                    Err(StorageError::NotFound) => Err(CompatError::NotFound),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the cached amount of a lock UTXO, avoiding a chain query on
    /// the v0 query path.
    pub fn get_amount_from_utxo(
        &self,
        tx_hash_v0: &[u8; 32],
        v_out: u32,
    ) -> Result<U256, CompatError> {
        match self.kv.get(&amount_key(tx_hash_v0, v_out)) {
            Ok(bytes) => {
                let s = std::str::from_utf8(&bytes)
                    .map_err(|e| CompatError::Corrupt(e.to_string()))?;
                U256::from_dec_str(s).map_err(|e| CompatError::Corrupt(e.to_string()))
            }
            Err(StorageError::NotFound) => Err(CompatError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the preserved v0 payload of a lock UTXO, verbatim as
    /// submitted, so the query side restores the original ABI rather than
    /// a lossy re-creation.
    pub fn get_payload_from_utxo(
        &self,
        tx_hash_v0: &[u8; 32],
        v_out: u32,
    ) -> Result<serde_json::Value, CompatError> {
        match self.kv.get(&payload_key(tx_hash_v0, v_out)) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| CompatError::Corrupt(e.to_string()))
            }
            Err(StorageError::NotFound) => Err(CompatError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Computes and persists the v0 mapping for a natively-submitted v1
    /// burn, so later v0-shaped queries by ref or v0 hash find it.
    pub fn persist_v0_burn_from_v1(&self, v1tx: &Transaction) -> Result<[u8; 32], CompatError> {
        let contract = to_from_v1_selector(&v1tx.selector)?;
        let burn_ref = U256::from_big_endian(&v1tx.input.nonce);
        let v0_hash = burn_tx_hash(&contract, burn_ref);
        self.set(&v0_hash_key(&v0_hash), v1tx.hash.0.to_vec())?;
        self.set(&ref_key(v1tx.selector.as_str(), burn_ref), v1tx.hash.0.to_vec())?;
        Ok(v0_hash)
    }
}

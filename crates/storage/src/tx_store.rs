// Path: crates/storage/src/tx_store.rs
//! The redb-backed transaction store.

use lightnode_api::storage::{StorageError, TxStore};
use lightnode_types::selector::Selector;
use lightnode_types::tx::{
    LockMintBurnReleaseInput, LockMintBurnReleaseOutput, Transaction, TxHash, TxStatus, Version,
};
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// ---- Table definitions (single DB) ----
/// Rows keyed by the 32-byte v1 content hash.
const TXS: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("TXS");
/// Time index: key = [created_at_be(8)][hash(32)], value = ().
/// Gives `page` its stable (created_at, hash) ordering and `prune` a
/// single range scan.
const TXS_BY_TIME: TableDefinition<&[u8], ()> = TableDefinition::new("TXS_BY_TIME");

fn be64(x: u64) -> [u8; 8] {
    x.to_be_bytes()
}

fn k_time(created_at: u64, hash: &TxHash) -> Vec<u8> {
    [be64(created_at).as_slice(), &hash.0].concat()
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn backend(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// The serialized row format. Input and output are stored as their JSON
/// wire bytes so the row survives additions to the typed structs.
#[derive(Serialize, Deserialize)]
struct TxRow {
    version: u8,
    selector: String,
    input: Vec<u8>,
    output: Vec<u8>,
    status: u8,
    created_at: u64,
}

impl TxRow {
    fn from_tx(tx: &Transaction, status: TxStatus, created_at: u64) -> Result<Self, StorageError> {
        Ok(Self {
            version: match tx.version {
                Version::V0 => 0,
                Version::V1 => 1,
            },
            selector: tx.selector.as_str().to_string(),
            input: serde_json::to_vec(&tx.input.to_json()).map_err(backend)?,
            output: serde_json::to_vec(&tx.output.to_json()).map_err(backend)?,
            status: match status {
                TxStatus::Confirming => 0,
                TxStatus::Confirmed => 1,
            },
            created_at,
        })
    }

    fn status(&self) -> Result<TxStatus, StorageError> {
        match self.status {
            0 => Ok(TxStatus::Confirming),
            1 => Ok(TxStatus::Confirmed),
            other => Err(StorageError::Decode(format!("unknown status {other}"))),
        }
    }

    fn into_tx(self, hash: TxHash) -> Result<Transaction, StorageError> {
        let version = match self.version {
            0 => Version::V0,
            1 => Version::V1,
            other => return Err(StorageError::Decode(format!("unknown version {other}"))),
        };
        let selector =
            Selector::new(&self.selector).map_err(|e| StorageError::Decode(e.to_string()))?;
        let input_json: serde_json::Value =
            serde_json::from_slice(&self.input).map_err(|e| StorageError::Decode(e.to_string()))?;
        let input = LockMintBurnReleaseInput::from_json(&input_json)
            .map_err(|e| StorageError::Decode(e.to_string()))?;
        let output_json: serde_json::Value = serde_json::from_slice(&self.output)
            .map_err(|e| StorageError::Decode(e.to_string()))?;
        let output = LockMintBurnReleaseOutput::from_json(&output_json)
            .map_err(|e| StorageError::Decode(e.to_string()))?;
        Ok(Transaction { version, hash, selector, input, output })
    }
}

/// A durable transaction store on a single redb file.
#[derive(Clone)]
pub struct RedbTxStore {
    db: Arc<Database>,
}

impl RedbTxStore {
    /// Opens (or creates) the store at `path`. Schema creation is
    /// idempotent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(backend)?;
        {
            let w = db.begin_write().map_err(backend)?;
            {
                w.open_table(TXS).map_err(backend)?;
                w.open_table(TXS_BY_TIME).map_err(backend)?;
            }
            w.commit().map_err(backend)?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    fn read_txn(&self) -> Result<ReadTransaction<'_>, StorageError> {
        self.db.begin_read().map_err(backend)
    }

    fn write_txn(&self) -> Result<WriteTransaction<'_>, StorageError> {
        self.db.begin_write().map_err(backend)
    }

    fn insert_at(&self, tx: &Transaction, created_at: u64) -> Result<(), StorageError> {
        let row = TxRow::from_tx(tx, TxStatus::Confirming, created_at)?;
        let encoded = bincode::serialize(&row).map_err(backend)?;
        let w = self.write_txn()?;
        {
            let mut txs = w.open_table(TXS).map_err(backend)?;
            if txs.get(&tx.hash.0).map_err(backend)?.is_some() {
                return Err(StorageError::DuplicateTx(tx.hash));
            }
            txs.insert(&tx.hash.0, encoded.as_slice()).map_err(backend)?;
            let mut by_time = w.open_table(TXS_BY_TIME).map_err(backend)?;
            by_time.insert(k_time(created_at, &tx.hash).as_slice(), ()).map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    fn row(&self, hash: &TxHash) -> Result<TxRow, StorageError> {
        let r = self.read_txn()?;
        let txs = r.open_table(TXS).map_err(backend)?;
        let bytes = txs
            .get(&hash.0)
            .map_err(backend)?
            .ok_or(StorageError::NotFound)?
            .value()
            .to_vec();
        bincode::deserialize(&bytes).map_err(|e| StorageError::Decode(e.to_string()))
    }

    /// Collects the hashes in the time index within `range`, in key order.
    fn time_range(
        &self,
        from: Option<u64>,
        to: Option<u64>,
    ) -> Result<Vec<(u64, TxHash)>, StorageError> {
        let r = self.read_txn()?;
        let by_time = r.open_table(TXS_BY_TIME).map_err(backend)?;
        let lo = from.map(be64).unwrap_or([0u8; 8]);
        let hi_key;
        let iter = match to {
            Some(t) => {
                hi_key = be64(t);
                by_time.range(lo.as_slice()..hi_key.as_slice()).map_err(backend)?
            }
            None => by_time.range(lo.as_slice()..).map_err(backend)?,
        };
        let mut out = Vec::new();
        for entry in iter {
            let (k, _) = entry.map_err(backend)?;
            let key = k.value();
            if key.len() != 40 {
                return Err(StorageError::Decode(format!("bad time key length {}", key.len())));
            }
            let mut ts = [0u8; 8];
            ts.copy_from_slice(&key[..8]);
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&key[8..]);
            out.push((u64::from_be_bytes(ts), TxHash(hash)));
        }
        Ok(out)
    }
}

impl TxStore for RedbTxStore {
    fn insert(&self, tx: &Transaction) -> Result<(), StorageError> {
        self.insert_at(tx, now_unix())
    }

    fn get(&self, hash: &TxHash) -> Result<Transaction, StorageError> {
        self.row(hash)?.into_tx(*hash)
    }

    fn status(&self, hash: &TxHash) -> Result<TxStatus, StorageError> {
        self.row(hash)?.status()
    }

    fn page(&self, offset: u64, limit: u64) -> Result<Vec<Transaction>, StorageError> {
        let hashes = self.time_range(None, None)?;
        hashes
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(_, hash)| self.get(&hash))
            .collect()
    }

    fn pending(&self, max_age: Duration) -> Result<Vec<Transaction>, StorageError> {
        let cutoff = now_unix().saturating_sub(max_age.as_secs());
        let mut out = Vec::new();
        for (_, hash) in self.time_range(Some(cutoff), None)? {
            let row = self.row(&hash)?;
            if row.status()? != TxStatus::Confirmed {
                out.push(row.into_tx(hash)?);
            }
        }
        Ok(out)
    }

    fn update_status(&self, hash: &TxHash, status: TxStatus) -> Result<(), StorageError> {
        let mut row = self.row(hash)?;
        row.status = match status {
            TxStatus::Confirming => 0,
            TxStatus::Confirmed => 1,
        };
        let encoded = bincode::serialize(&row).map_err(backend)?;
        let w = self.write_txn()?;
        {
            let mut txs = w.open_table(TXS).map_err(backend)?;
            txs.insert(&hash.0, encoded.as_slice()).map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    fn prune(&self, age: Duration) -> Result<usize, StorageError> {
        let cutoff = now_unix().saturating_sub(age.as_secs());
        let doomed = self.time_range(None, Some(cutoff))?;
        if doomed.is_empty() {
            return Ok(0);
        }
        let w = self.write_txn()?;
        {
            let mut txs = w.open_table(TXS).map_err(backend)?;
            let mut by_time = w.open_table(TXS_BY_TIME).map_err(backend)?;
            for (created_at, hash) in &doomed {
                txs.remove(&hash.0).map_err(backend)?;
                by_time.remove(k_time(*created_at, hash).as_slice()).map_err(backend)?;
            }
        }
        w.commit().map_err(backend)?;
        tracing::debug!(target: "storage", pruned = doomed.len(), "pruned transactions");
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U256;
    use rand::RngCore as _;

    fn tmp_store() -> (tempfile::TempDir, RedbTxStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbTxStore::open(dir.path().join("txs.redb")).unwrap();
        (dir, store)
    }

    fn random_tx() -> Transaction {
        let mut rng = rand::thread_rng();
        let mut nonce = [0u8; 32];
        rng.fill_bytes(&mut nonce);
        let mut txid = vec![0u8; 32];
        rng.fill_bytes(&mut txid);
        let payload = Vec::new();
        let input = LockMintBurnReleaseInput {
            phash: lightnode_types::hash::phash(&payload),
            nhash: lightnode_types::hash::nhash(&nonce, &txid, 0),
            txid,
            txindex: 0,
            amount: U256::from(rng.next_u64()),
            payload,
            to: "0x7DDFA2e5435027f6e13Ca8Db2f32ebd5551158Bb".to_string(),
            nonce,
            gpubkey: vec![2u8; 33],
            ghash: [3u8; 32],
        };
        Transaction::new(Version::V1, Selector::new("BTC/toEthereum").unwrap(), input).unwrap()
    }

    #[test]
    fn insert_then_get_roundtrips() {
        let (_dir, store) = tmp_store();
        let tx = random_tx();
        store.insert(&tx).unwrap();
        let got = store.get(&tx.hash).unwrap();
        assert_eq!(got, tx);
        assert_eq!(store.status(&tx.hash).unwrap(), TxStatus::Confirming);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let (_dir, store) = tmp_store();
        let tx = random_tx();
        store.insert(&tx).unwrap();
        assert!(matches!(store.insert(&tx), Err(StorageError::DuplicateTx(_))));
    }

    #[test]
    fn get_missing_is_not_found() {
        let (_dir, store) = tmp_store();
        assert!(matches!(store.get(&TxHash([9u8; 32])), Err(StorageError::NotFound)));
    }

    #[test]
    fn page_orders_by_created_at_then_hash() {
        let (_dir, store) = tmp_store();
        let txs: Vec<_> = (0..5).map(|_| random_tx()).collect();
        for (i, tx) in txs.iter().enumerate() {
            store.insert_at(tx, 1000 + i as u64).unwrap();
        }
        let page = store.page(1, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].hash, txs[1].hash);
        assert_eq!(page[1].hash, txs[2].hash);
    }

    #[test]
    fn update_status_and_pending() {
        let (_dir, store) = tmp_store();
        let a = random_tx();
        let b = random_tx();
        store.insert(&a).unwrap();
        store.insert(&b).unwrap();
        store.update_status(&a.hash, TxStatus::Confirmed).unwrap();
        let pending = store.pending(Duration::from_secs(3600)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].hash, b.hash);
    }

    #[test]
    fn prune_removes_only_old_rows() {
        let (_dir, store) = tmp_store();
        let now = now_unix();
        let mut fresh = Vec::new();
        for i in 0..50 {
            let tx = random_tx();
            if i < 25 {
                // Back-dated by 24 hours.
                store.insert_at(&tx, now - 24 * 3600).unwrap();
            } else {
                store.insert_at(&tx, now).unwrap();
                fresh.push(tx.hash);
            }
        }
        let removed = store.prune(Duration::from_secs(3600)).unwrap();
        assert_eq!(removed, 25);
        let remaining = store.page(0, 100).unwrap();
        assert_eq!(remaining.len(), 25);
        for tx in &remaining {
            assert!(fresh.contains(&tx.hash));
        }
        // The survivors are all pending within the hour.
        assert_eq!(store.pending(Duration::from_secs(3600)).unwrap().len(), 25);
    }
}

// Path: crates/api/src/storage.rs
//! Storage seams: the durable transaction store and the shared TTL cache.

use lightnode_types::tx::{Transaction, TxHash, TxStatus};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the storage backends.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The requested key was not found.
    #[error("not found")]
    NotFound,
    /// An insert collided with an existing transaction hash.
    #[error("transaction {0} already stored")]
    DuplicateTx(TxHash),
    /// An error occurred in the storage backend.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// A stored row failed to decode.
    #[error("storage decode error: {0}")]
    Decode(String),
}

impl lightnode_types::error::ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "STORE_NOT_FOUND",
            Self::DuplicateTx(_) => "STORE_DUPLICATE_TX",
            Self::Backend(_) => "STORE_BACKEND_ERROR",
            Self::Decode(_) => "STORE_DECODE_ERROR",
        }
    }
}

/// The durable transaction store, keyed by the v1 content hash.
///
/// Implementations serialise writes internally; callers needing
/// read-then-insert atomicity (the tx checker's dedup) hold their own
/// mutex around the pair.
pub trait TxStore: Send + Sync {
    /// Persists a new transaction with status `Confirming`. Fails with
    /// [`StorageError::DuplicateTx`] when the hash is already present.
    fn insert(&self, tx: &Transaction) -> Result<(), StorageError>;

    /// Fetches a transaction by hash.
    fn get(&self, hash: &TxHash) -> Result<Transaction, StorageError>;

    /// Fetches the stored status of a transaction.
    fn status(&self, hash: &TxHash) -> Result<TxStatus, StorageError>;

    /// Returns a stable page of transactions ordered by
    /// `(created_at, hash)`.
    fn page(&self, offset: u64, limit: u64) -> Result<Vec<Transaction>, StorageError>;

    /// Returns transactions that are not yet confirmed and were created
    /// within `max_age`.
    fn pending(&self, max_age: Duration) -> Result<Vec<Transaction>, StorageError>;

    /// Updates the status of a stored transaction.
    fn update_status(&self, hash: &TxHash, status: TxStatus) -> Result<(), StorageError>;

    /// Deletes every transaction older than `age`, returning the number of
    /// rows removed.
    fn prune(&self, age: Duration) -> Result<usize, StorageError>;
}

/// A process-wide TTL key-value cache.
///
/// Used as the compat mapping store and the watcher cursor store. Writes
/// to the same key race with undefined order, but each individual write is
/// atomic. A zero TTL means the entry never expires.
pub trait KvStore: Send + Sync {
    /// Sets `key` to `value`, expiring after `ttl` (`None` or zero = never).
    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StorageError>;

    /// Fetches the value at `key`, if present and not expired.
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Removes the value at `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

// Path: crates/compat/src/error.rs
//! Errors shared across the compat engine.

use lightnode_api::chain::ChainClientError;
use lightnode_api::storage::StorageError;
use lightnode_types::error::{ErrorCode, TxError, ValueError};
use thiserror::Error;

/// Errors produced by the compat store and translator.
#[derive(Error, Debug)]
pub enum CompatError {
    /// No mapping exists for the queried hash, UTXO, or ref.
    #[error("no compat mapping found")]
    NotFound,
    /// The legacy contract name could not be parsed.
    #[error("malformed legacy contract name {0:?}")]
    MalformedContract(String),
    /// The v0 argument list did not match the declared contract ABI.
    #[error("legacy abi mismatch: {0}")]
    Abi(String),
    /// Legacy list values have no canonical binary form and are rejected
    /// at the serialization edge.
    #[error("legacy list values are not binary-serializable")]
    ListNotSerializable,
    /// A stored mapping failed to decode.
    #[error("compat mapping corrupted: {0}")]
    Corrupt(String),
    /// The shared cache or transaction store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A value failed to encode or decode.
    #[error(transparent)]
    Value(#[from] ValueError),
    /// A transaction failed to build or validate.
    #[error(transparent)]
    Tx(#[from] TxError),
    /// A chain client or address codec failed.
    #[error(transparent)]
    Chain(#[from] ChainClientError),
}

impl ErrorCode for CompatError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "COMPAT_NOT_FOUND",
            Self::MalformedContract(_) => "COMPAT_MALFORMED_CONTRACT",
            Self::Abi(_) => "COMPAT_ABI_MISMATCH",
            Self::ListNotSerializable => "COMPAT_LIST_NOT_SERIALIZABLE",
            Self::Corrupt(_) => "COMPAT_MAPPING_CORRUPT",
            Self::Storage(e) => e.code(),
            Self::Value(e) => e.code(),
            Self::Tx(e) => e.code(),
            Self::Chain(e) => e.code(),
        }
    }
}

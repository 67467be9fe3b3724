// Path: crates/api/src/chain.rs
//! Chain-side client seams and the per-chain address codec registry.

use async_trait::async_trait;
use primitive_types::U256;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by chain clients and address codecs.
#[derive(Error, Debug)]
pub enum ChainClientError {
    /// The referenced output does not exist on the chain.
    #[error("output {}:{} not found", hex::encode(.txid), .vout)]
    OutputNotFound {
        /// The transaction id, chain-canonical byte order.
        txid: Vec<u8>,
        /// The output index.
        vout: u32,
    },
    /// The chain RPC transport failed.
    #[error("chain rpc error: {0}")]
    Rpc(String),
    /// An address failed to decode or encode for the chain.
    #[error("address codec error on {chain}: {msg}")]
    AddressCodec {
        /// The chain whose codec rejected the address.
        chain: String,
        /// The codec's message.
        msg: String,
    },
    /// No codec is registered for the chain.
    #[error("no address codec registered for chain {0}")]
    UnknownChain(String),
}

impl lightnode_types::error::ErrorCode for ChainClientError {
    fn code(&self) -> &'static str {
        match self {
            Self::OutputNotFound { .. } => "CHAIN_OUTPUT_NOT_FOUND",
            Self::Rpc(_) => "CHAIN_RPC_ERROR",
            Self::AddressCodec { .. } => "CHAIN_ADDRESS_CODEC_ERROR",
            Self::UnknownChain(_) => "CHAIN_UNKNOWN",
        }
    }
}

/// A transaction output as reported by a UTXO chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    /// The output value.
    pub amount: U256,
    /// The locking script of the output.
    pub pubkey_script: Vec<u8>,
}

/// A client able to look up outputs on a UTXO chain. Account-based lock
/// chains implement the same seam with `vout` pinned to zero.
#[async_trait]
pub trait UtxoClient: Send + Sync {
    /// Fetches the output at `(txid, vout)`; `txid` is chain-canonical
    /// byte order.
    async fn output(&self, txid: &[u8], vout: u32) -> Result<Utxo, ChainClientError>;
}

/// Encodes and decodes addresses for one chain family on one network.
pub trait AddressEncodeDecoder: Send + Sync {
    /// Decodes a string address into the raw bytes that feed `ghash`.
    fn decode_address(&self, addr: &str) -> Result<Vec<u8>, ChainClientError>;

    /// Encodes raw address bytes into the chain's string form.
    fn encode_address(&self, raw: &[u8]) -> Result<String, ChainClientError>;
}

/// A per-chain dispatch table of address codecs.
#[derive(Default)]
pub struct AddressCodecRegistry {
    codecs: BTreeMap<String, Arc<dyn AddressEncodeDecoder>>,
}

impl AddressCodecRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the codec for a chain, replacing any previous one.
    pub fn register(&mut self, chain: &str, codec: Arc<dyn AddressEncodeDecoder>) {
        self.codecs.insert(chain.to_string(), codec);
    }

    /// Looks up the codec for a chain.
    pub fn codec(&self, chain: &str) -> Result<&Arc<dyn AddressEncodeDecoder>, ChainClientError> {
        self.codecs.get(chain).ok_or_else(|| ChainClientError::UnknownChain(chain.to_string()))
    }

    /// Decodes `addr` with the codec registered for `chain`.
    pub fn decode(&self, chain: &str, addr: &str) -> Result<Vec<u8>, ChainClientError> {
        self.codec(chain)?.decode_address(addr)
    }

    /// Encodes `raw` with the codec registered for `chain`.
    pub fn encode(&self, chain: &str, raw: &[u8]) -> Result<String, ChainClientError> {
        self.codec(chain)?.encode_address(raw)
    }
}

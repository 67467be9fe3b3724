// Path: crates/api/src/fetcher.rs
//! Burn-event fetcher seams feeding the watcher.

use async_trait::async_trait;
use primitive_types::U256;
use thiserror::Error;

/// Errors surfaced by burn-log fetchers.
#[derive(Error, Debug)]
pub enum FetcherError {
    /// The chain RPC transport failed.
    #[error("fetcher rpc error: {0}")]
    Rpc(String),
    /// A log or account payload failed to decode.
    #[error("fetcher decode error: {0}")]
    Decode(String),
}

impl lightnode_types::error::ErrorCode for FetcherError {
    fn code(&self) -> &'static str {
        match self {
            Self::Rpc(_) => "FETCHER_RPC_ERROR",
            Self::Decode(_) => "FETCHER_DECODE_ERROR",
        }
    }
}

/// One burn event observed on a host chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventInfo {
    /// The burned asset tag (`BTC`, `ZEC`, ...).
    pub asset: String,
    /// The chain funds are to be released on.
    pub target_chain: String,
    /// The host-chain transaction that emitted the event.
    pub txid: Vec<u8>,
    /// The burned amount.
    pub amount: U256,
    /// The recipient address, raw as emitted by the contract.
    pub to_bytes: Vec<u8>,
    /// The burn nonce.
    pub nonce: [u8; 32],
    /// The height (or burn index) the event was observed at.
    pub block_number: u64,
}

/// Fetches burn events for one `(chain, asset-set)` pair.
///
/// For account chains whose gateway keeps a monotone burn counter instead
/// of emitting logs (Solana), `latest_block_height` reports that counter
/// and `fetch_burn_logs` iterates burn indices; the watcher treats both
/// identically.
#[async_trait]
pub trait BurnLogFetcher: Send + Sync {
    /// The current chain height, or the monotone burn count.
    async fn latest_block_height(&self) -> Result<u64, FetcherError>;

    /// Fetches burn events in `[from, to)`.
    async fn fetch_burn_logs(&self, from: u64, to: u64) -> Result<Vec<EventInfo>, FetcherError>;
}

// Path: crates/watcher/src/lib.rs
#![forbid(unsafe_code)]

//! # Lightnode Watcher
//!
//! One poller per `(chain, asset)` pair watches the host-chain gateway
//! contract for burn events, synthesizes the corresponding gateway-format
//! release transactions, records the legacy mappings, and submits through
//! the resolver pipeline. The durable cursor only ever advances, and only
//! after every event in a batch was submitted, so a failed tick retries
//! from the same height and the checker's dedup absorbs the repeats.

/// The EVM burn-log fetcher.
pub mod evm;
/// The Solana burn-record fetcher.
pub mod solana;
/// The generic poll loop.
pub mod watcher;

pub use evm::{EvmFetcher, EvmLogProvider, RawLog};
pub use solana::{SolanaFetcher, SolanaRpcProvider};
pub use watcher::{TxSubmitter, Watcher, WatcherConfig};

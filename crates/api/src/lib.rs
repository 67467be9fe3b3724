// Path: crates/api/src/lib.rs
#![forbid(unsafe_code)]

//! # Lightnode API
//!
//! The trait seams between the gateway core and its external
//! collaborators: stores, chain clients, the Darknode dispatcher, burn-log
//! fetchers, address codecs, and the sanctions screener.
//!
//! Everything here is an object-safe trait so the node crate can construct
//! concrete adapters once at process start and thread them through the
//! component graph as `Arc<dyn …>` dependencies. Components never reach
//! for module-level singletons.

/// Chain-side clients and the per-chain address codec registry.
pub mod chain;
/// The Darknode JSON-RPC dispatcher seam.
pub mod darknode;
/// Burn-event fetchers feeding the watcher.
pub mod fetcher;
/// The sanctions screener seam.
pub mod screener;
/// Transaction store and TTL key-value cache seams.
pub mod storage;

pub use chain::{AddressCodecRegistry, AddressEncodeDecoder, ChainClientError, Utxo, UtxoClient};
pub use darknode::{DarknodeCaller, DarknodeError};
pub use fetcher::{BurnLogFetcher, EventInfo, FetcherError};
pub use screener::{Screener, ScreenerError};
pub use storage::{KvStore, StorageError, TxStore};

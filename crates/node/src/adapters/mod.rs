// Path: crates/node/src/adapters/mod.rs
//! Thin concrete adapters behind the `lightnode-api` seams: outbound HTTP
//! clients and per-chain address codecs. Everything here is wiring; the
//! gateway logic lives in the library crates.

mod codecs;
mod darknode;
mod evm;
mod solana;
mod utxo;

pub use codecs::{Base58CheckCodec, EthereumCodec};
pub use darknode::HttpDarknodeCaller;
pub use evm::EvmRpc;
pub use solana::SolanaRpc;
pub use utxo::BitcoindClient;

// Path: crates/compat/src/lib.rs
#![forbid(unsafe_code)]

//! # Lightnode Compat
//!
//! The v0↔v1 compatibility engine: the legacy v0 transaction model and
//! codec, the legacy keccak fingerprint recipes, the persistent
//! bidirectional mapping store, and the stateful translator that lets v0
//! SDKs keep working against current Darknodes.
//!
//! The v0 and v1 hash recipes differ in the byte order of the txid and in
//! what feeds `ghash`. They are deliberately exposed as distinct named
//! functions ([`hash`] here versus `lightnode_types::hash`), never as one
//! function parameterised by a version flag.

/// Errors shared across the compat engine.
pub mod error;
/// The legacy v0 keccak recipes and contract-name mapping.
pub mod hash;
/// Synthesized legacy responses (`ren_queryShards`, `ren_queryFees`).
pub mod legacy;
/// The persistent v0↔v1 mapping store.
pub mod store;
/// The bidirectional translator.
pub mod translate;
/// The legacy v0 transaction model and codec.
pub mod v0;

pub use error::CompatError;
pub use store::CompatStore;

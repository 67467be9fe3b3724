// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Lightnode Types
//!
//! This crate is the foundational library for the Lightnode gateway,
//! containing the typed value model, the v1 transaction model, selectors,
//! the canonical hash recipes, and the shared error and configuration
//! types.
//!
//! ## Architectural Role
//!
//! As the base crate, `lightnode-types` has minimal dependencies and is
//! itself a dependency for almost every other crate in the workspace. This
//! structure prevents circular dependencies and provides a stable,
//! canonical definition for shared types like `Transaction`, `Selector`,
//! `TxHash`, and the error enums.

/// The maximum size in bytes for an address value on the wire.
pub const MAX_ADDRESS_BYTES: usize = 1024; // 1 KiB
/// The maximum size in bytes for a string value on the wire.
pub const MAX_STRING_BYTES: usize = 10 * 1024; // 10 KiB
/// The maximum size in bytes for a variable byte-string value on the wire.
pub const MAX_BYTES_LEN: usize = 1024 * 1024; // 1 MiB
/// The maximum number of fields in a record value.
pub const MAX_RECORD_FIELDS: usize = 50;
/// The maximum number of elements in a generic list value.
pub const MAX_LIST_LEN: usize = 64;
/// The maximum number of elements in a nested (payload-carried) list.
pub const MAX_NESTED_LIST_LEN: usize = 8192;
/// The maximum number of entries in a UTXO array.
pub const MAX_UTXO_LIST_LEN: usize = 4096;
/// The maximum length of a record field name.
pub const MAX_FIELD_NAME_BYTES: usize = 256;

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::ValueError> = std::result::Result<T, E>;

/// Shared configuration structures for the gateway and its components.
pub mod config;
/// A unified set of the error types used across the workspace.
pub mod error;
/// The v1 keccak-256 fingerprint recipes and the content-addressed tx hash.
pub mod hash;
/// Cross-chain selectors (`BTC/toEthereum`, `BTC/fromEthereum`, ...).
pub mod selector;
/// The v1 transaction model: inputs, outputs, versions, and hashes.
pub mod tx;
/// The tagged value model with its JSON and canonical binary codecs.
pub mod value;

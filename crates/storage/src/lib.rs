// Path: crates/storage/src/lib.rs
#![forbid(unsafe_code)]

//! Persistent storage for the Lightnode gateway.
//!
//! Two backends live here: [`RedbTxStore`], the durable transaction store
//! keyed by the v1 content hash, and [`MemKv`], the process-wide TTL
//! key-value cache shared by the compat mapping store and the watcher
//! cursors.

mod kv;
mod tx_store;

pub use kv::MemKv;
pub use tx_store::RedbTxStore;

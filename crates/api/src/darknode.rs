// Path: crates/api/src/darknode.rs
//! The seam to the Darknode JSON-RPC dispatcher.
//!
//! The connection pool, peer selection, and retry policy live behind this
//! trait in the node crate; the gateway core only ever sees a method name
//! and raw params.

use async_trait::async_trait;
use serde_json::Value as Json;
use thiserror::Error;

/// Errors surfaced by the Darknode dispatcher.
#[derive(Error, Debug)]
pub enum DarknodeError {
    /// The transport to every candidate Darknode failed.
    #[error("darknode dispatch failed: {0}")]
    Transport(String),
    /// A Darknode answered with a JSON-RPC error object.
    #[error("darknode returned error {code}: {message}")]
    Remote {
        /// The JSON-RPC error code.
        code: i64,
        /// The JSON-RPC error message.
        message: String,
    },
    /// The dispatcher's outbound queue refused the request.
    #[error("too much back pressure on darknode dispatch")]
    BackPressure,
}

impl lightnode_types::error::ErrorCode for DarknodeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "DARKNODE_TRANSPORT_ERROR",
            Self::Remote { .. } => "DARKNODE_REMOTE_ERROR",
            Self::BackPressure => "DARKNODE_BACK_PRESSURE",
        }
    }
}

/// Dispatches a JSON-RPC call to the Darknode cluster and returns the
/// `result` payload.
#[async_trait]
pub trait DarknodeCaller: Send + Sync {
    /// Calls `method` with `params` against a healthy Darknode.
    async fn call(&self, method: &str, params: Json) -> Result<Json, DarknodeError>;
}

// Path: crates/api/src/screener.rs
//! The sanctions screener seam.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the screener.
#[derive(Error, Debug)]
pub enum ScreenerError {
    /// The screening API transport failed.
    #[error("screener transport error: {0}")]
    Transport(String),
    /// The screening API answered with an unexpected status or shape.
    #[error("unexpected screener response: {0}")]
    UnexpectedResponse(String),
}

impl lightnode_types::error::ErrorCode for ScreenerError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "SCREENER_TRANSPORT_ERROR",
            Self::UnexpectedResponse(_) => "SCREENER_UNEXPECTED_RESPONSE",
        }
    }
}

/// Answers whether a destination address is sanctioned.
#[async_trait]
pub trait Screener: Send + Sync {
    /// True when `address` must not receive funds.
    async fn is_sanctioned(&self, address: &str) -> Result<bool, ScreenerError>;
}

// Path: crates/rpc/src/lib.rs
#![forbid(unsafe_code)]

//! # Lightnode RPC
//!
//! The request pipeline: a rate-limited validator in front, a per-method
//! cacher with single-flight dispatch behind it, a deep-semantic
//! transaction checker for submissions, and the resolver that ties the
//! method table together. The background confirmer and the sanctions
//! screener live here too, as does the thin axum surface.
//!
//! Every hop between components is a bounded channel with a strict
//! send-or-error policy; a full queue is reported as back pressure rather
//! than blocking the caller.

/// The single-flight TTL response cache and Darknode dispatch pool.
pub mod cacher;
/// The deep-semantic transaction checker and its verifier strategy.
pub mod checker;
/// The background sweep that confirms pending transactions.
pub mod confirmer;
/// JSON-RPC framing: requests, responses, error codes, method names.
pub mod jsonrpc;
/// Token-bucket rate limiting, global and per client.
pub mod limiter;
/// The top-level method dispatch.
pub mod resolver;
/// The sanctions screener client.
pub mod screener;
/// The axum HTTP surface.
pub mod server;
/// Request validation and v0→v1 rewriting.
pub mod validator;

pub use cacher::Cacher;
pub use checker::{TxChecker, Verifier};
pub use confirmer::Confirmer;
pub use limiter::RateLimiter;
pub use resolver::Resolver;
pub use validator::Validator;

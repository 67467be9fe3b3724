// Path: crates/types/src/error.rs
//! Core error types for the Lightnode gateway.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors produced by the typed value model and its codecs.
#[derive(Error, Debug)]
pub enum ValueError {
    /// A length-prefixed field exceeded its hard upper bound.
    #[error("{what} length {len} exceeds maximum {max}")]
    TooLong {
        /// What was being decoded or encoded.
        what: &'static str,
        /// The observed length.
        len: usize,
        /// The enforced maximum.
        max: usize,
    },
    /// The binary stream ended before the value was complete.
    #[error("unexpected end of input while reading {0}")]
    UnexpectedEnd(&'static str),
    /// An unknown type tag was encountered in the binary stream.
    #[error("unknown value tag {0:#04x}")]
    UnknownTag(u8),
    /// An unknown type name was encountered in a JSON type descriptor.
    #[error("unknown type name {0:?}")]
    UnknownTypeName(String),
    /// A JSON value did not match the expected type.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// The expected type name.
        expected: &'static str,
        /// A description of what was found.
        got: String,
    },
    /// A base64 or hex string failed to decode.
    #[error("invalid {encoding} encoding: {msg}")]
    InvalidEncoding {
        /// The encoding that failed ("base64", "hex", "utf-8").
        encoding: &'static str,
        /// The underlying decoder message.
        msg: String,
    },
    /// A fixed-width field had the wrong byte length.
    #[error("invalid length for {what}: expected {expected}, got {got}")]
    InvalidLength {
        /// What was being decoded.
        what: &'static str,
        /// The expected byte length.
        expected: usize,
        /// The observed byte length.
        got: usize,
    },
    /// An integer string failed to parse, or overflowed its width.
    #[error("invalid integer: {0}")]
    InvalidInteger(String),
    /// Trailing bytes remained after a complete value was decoded.
    #[error("trailing bytes after value")]
    TrailingBytes,
}

impl ErrorCode for ValueError {
    fn code(&self) -> &'static str {
        match self {
            Self::TooLong { .. } => "VALUE_TOO_LONG",
            Self::UnexpectedEnd(_) => "VALUE_UNEXPECTED_END",
            Self::UnknownTag(_) => "VALUE_UNKNOWN_TAG",
            Self::UnknownTypeName(_) => "VALUE_UNKNOWN_TYPE_NAME",
            Self::TypeMismatch { .. } => "VALUE_TYPE_MISMATCH",
            Self::InvalidEncoding { .. } => "VALUE_INVALID_ENCODING",
            Self::InvalidLength { .. } => "VALUE_INVALID_LENGTH",
            Self::InvalidInteger(_) => "VALUE_INVALID_INTEGER",
            Self::TrailingBytes => "VALUE_TRAILING_BYTES",
        }
    }
}

/// Errors produced while parsing or resolving selectors.
#[derive(Error, Debug)]
pub enum SelectorError {
    /// The selector string did not match `<ASSET>/to<CHAIN>` or `<ASSET>/from<CHAIN>`.
    #[error("malformed selector {0:?}")]
    Malformed(String),
    /// The asset tag is not one the gateway recognises.
    #[error("unknown asset {0:?}")]
    UnknownAsset(String),
}

impl ErrorCode for SelectorError {
    fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "SELECTOR_MALFORMED",
            Self::UnknownAsset(_) => "SELECTOR_UNKNOWN_ASSET",
        }
    }
}

/// Errors produced by transaction construction and validation.
#[derive(Error, Debug)]
pub enum TxError {
    /// A submitted fingerprint did not agree with the recomputed value.
    #[error("{field} does not match the value derived from the transaction input")]
    HashMismatch {
        /// Which fingerprint disagreed ("phash", "nhash", "ghash", "hash").
        field: &'static str,
    },
    /// A required input field was absent or had the wrong type.
    #[error("invalid input field {field}: {msg}")]
    InvalidField {
        /// The field name.
        field: &'static str,
        /// What was wrong with it.
        msg: String,
    },
    /// The transaction input could not be serialized for hashing.
    #[error("marshal failed: {0}")]
    Marshal(#[from] ValueError),
    /// The selector was rejected.
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

impl ErrorCode for TxError {
    fn code(&self) -> &'static str {
        match self {
            Self::HashMismatch { .. } => "TX_HASH_MISMATCH",
            Self::InvalidField { .. } => "TX_INVALID_FIELD",
            Self::Marshal(_) => "TX_MARSHAL_FAILED",
            Self::Selector(_) => "TX_SELECTOR_INVALID",
        }
    }
}

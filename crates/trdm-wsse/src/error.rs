use thiserror::Error;
use trdm_crypto::CryptoError;

/// Errors from envelope construction, canonicalization, and verification.
#[derive(Debug, Error)]
pub enum WsseError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// `Expires` must land strictly after `Created`.
    #[error("timestamp validity must be at least one millisecond")]
    InvalidValidity,

    #[error("timestamp out of range")]
    TimestampOutOfRange,

    #[error("element not found: {0}")]
    MissingElement(String),

    /// A referenced id is absent or not unique.
    #[error("element id {id} occurs {count} times")]
    AmbiguousId { id: String, count: usize },

    #[error("unbound namespace prefix: {0}")]
    UnboundPrefix(String),

    #[error("unsupported reference URI: {0}")]
    UnsupportedReference(String),

    #[error("digest mismatch for reference {uri}")]
    DigestMismatch { uri: String },

    #[error("malformed XML: {0}")]
    Xml(String),
}

pub type WsseResult<T> = Result<T, WsseError>;

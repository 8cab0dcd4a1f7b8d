use std::path::PathBuf;

use thiserror::Error;

/// Errors from key loading, digesting, and signing.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Certificate or private key was not supplied at all.
    #[error("missing key material: {0}")]
    MissingMaterial(&'static str),

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Neither PKCS#1 nor PKCS#8 decoding succeeded.
    #[error("failed to parse private key (PKCS#1: {pkcs1}; PKCS#8: {pkcs8})")]
    InvalidPrivateKey { pkcs1: String, pkcs8: String },

    #[error("unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("private key does not match the certificate public key")]
    KeyMismatch,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type CryptoResult<T> = Result<T, CryptoError>;

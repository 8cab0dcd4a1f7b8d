//! Cryptographic primitives for TRDM table sync.
//!
//! Provides SHA-512 digests, RSA PKCS#1 v1.5 signing over SHA-512 digests,
//! X.509 certificate and private key loading, and random element ids for
//! WS-Security references.
//!
//! All crypto operations wrap established libraries. No custom cryptography.

pub mod algorithm;
pub mod certificate;
pub mod digest;
pub mod error;
pub mod id;
pub mod material;
pub mod signer;

pub use certificate::Certificate;
pub use digest::Digest512;
pub use error::{CryptoError, CryptoResult};
pub use id::{generate_id, IdPrefix};
pub use material::KeyMaterial;
pub use signer::{RsaSigningKey, RsaVerifyingKey};

/// Standard base64 with padding, as used in every XML-DSig value.
pub fn encode_base64(data: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode standard base64, ignoring ASCII whitespace (XML line wrapping).
pub fn decode_base64(data: &str) -> CryptoResult<Vec<u8>> {
    use base64::Engine as _;
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| CryptoError::Base64(e.to_string()))
}

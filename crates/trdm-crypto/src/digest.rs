use std::fmt;

use sha2::{Digest, Sha512};

use crate::error::{CryptoError, CryptoResult};

/// A 512-bit SHA-2 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest512([u8; 64]);

impl Digest512 {
    /// Hash raw bytes.
    pub fn of(data: &[u8]) -> Self {
        let out = Sha512::digest(data);
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&out);
        Self(bytes)
    }

    /// Hash a sequence of byte slices as if concatenated.
    pub fn of_parts<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = Sha512::new();
        for part in parts {
            hasher.update(part);
        }
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Parse a `DigestValue` text node.
    pub fn from_base64(text: &str) -> CryptoResult<Self> {
        let raw = crate::decode_base64(text)?;
        let bytes: [u8; 64] = raw
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::Base64(format!("expected 64 bytes, got {}", v.len())))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        crate::encode_base64(&self.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Digest512 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest512({}...)", hex::encode(&self.0[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(Digest512::of(b"hello"), Digest512::of(b"hello"));
        assert_ne!(Digest512::of(b"hello"), Digest512::of(b"hello!"));
    }

    #[test]
    fn known_vector_abc() {
        let d = Digest512::of(b"abc");
        assert_eq!(
            d.to_hex(),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn parts_equal_concatenation() {
        let parts: [&[u8]; 3] = [b"ab", b"", b"c"];
        assert_eq!(Digest512::of_parts(parts), Digest512::of(b"abc"));
    }

    #[test]
    fn base64_roundtrip() {
        let d = Digest512::of(b"body");
        assert_eq!(Digest512::from_base64(&d.to_base64()).unwrap(), d);
    }

    #[test]
    fn base64_wrong_length_rejected() {
        let short = crate::encode_base64(&[1u8; 32]);
        assert!(Digest512::from_base64(&short).is_err());
    }

    #[test]
    fn debug_is_abbreviated() {
        let s = format!("{:?}", Digest512::of(b"x"));
        assert!(s.starts_with("Digest512("));
        assert!(s.ends_with("...)"));
    }
}

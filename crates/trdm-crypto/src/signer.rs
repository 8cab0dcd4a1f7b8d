use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::Sha512;

use crate::digest::Digest512;
use crate::error::{CryptoError, CryptoResult};

/// RSA private key used for RSA-SHA512 signatures.
pub struct RsaSigningKey(RsaPrivateKey);

/// RSA public key used to verify RSA-SHA512 signatures.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaVerifyingKey(RsaPublicKey);

impl RsaSigningKey {
    pub fn from_private_key(key: RsaPrivateKey) -> Self {
        Self(key)
    }

    /// Decode a PEM private key, trying PKCS#1 first and then PKCS#8.
    ///
    /// Deployments differ: some environments ship `RSA PRIVATE KEY`
    /// (PKCS#1), others `PRIVATE KEY` (PKCS#8).
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        match RsaPrivateKey::from_pkcs1_pem(pem) {
            Ok(key) => Ok(Self(key)),
            Err(pkcs1) => RsaPrivateKey::from_pkcs8_pem(pem)
                .map(Self)
                .map_err(|pkcs8| CryptoError::InvalidPrivateKey {
                    pkcs1: pkcs1.to_string(),
                    pkcs8: pkcs8.to_string(),
                }),
        }
    }

    /// The corresponding public verifying key.
    pub fn verifying_key(&self) -> RsaVerifyingKey {
        RsaVerifyingKey(self.0.to_public_key())
    }

    /// Sign a precomputed SHA-512 digest (PKCS#1 v1.5, SHA-512 DigestInfo).
    pub fn sign_digest(&self, digest: &Digest512) -> CryptoResult<Vec<u8>> {
        self.0
            .sign(Pkcs1v15Sign::new::<Sha512>(), digest.as_bytes())
            .map_err(|e| CryptoError::Signing(e.to_string()))
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.0.size() * 8
    }
}

impl RsaVerifyingKey {
    pub fn from_public_key(key: RsaPublicKey) -> Self {
        Self(key)
    }

    /// Decode a DER `SubjectPublicKeyInfo`.
    pub fn from_spki_der(der: &[u8]) -> CryptoResult<Self> {
        RsaPublicKey::from_public_key_der(der)
            .map(Self)
            .map_err(|e| CryptoError::UnsupportedKey(e.to_string()))
    }

    /// Verify a signature over a precomputed SHA-512 digest.
    pub fn verify_digest(&self, digest: &Digest512, signature: &[u8]) -> CryptoResult<()> {
        self.0
            .verify(Pkcs1v15Sign::new::<Sha512>(), digest.as_bytes(), signature)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    pub fn bits(&self) -> usize {
        self.0.size() * 8
    }
}

impl std::fmt::Debug for RsaSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RsaSigningKey(<redacted>, {} bits)", self.bits())
    }
}

impl std::fmt::Debug for RsaVerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RsaVerifyingKey({} bits)", self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;

    #[test]
    fn pkcs1_and_pkcs8_decode_to_same_key() {
        let a = RsaSigningKey::from_pem(KEY_PKCS1_PEM).unwrap();
        let b = RsaSigningKey::from_pem(KEY_PKCS8_PEM).unwrap();
        assert_eq!(a.verifying_key(), b.verifying_key());
        assert_eq!(a.bits(), 2048);
    }

    #[test]
    fn garbage_key_reports_both_formats() {
        let err = RsaSigningKey::from_pem("not a key").unwrap_err();
        match err {
            CryptoError::InvalidPrivateKey { pkcs1, pkcs8 } => {
                assert!(!pkcs1.is_empty());
                assert!(!pkcs8.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sign_and_verify() {
        let sk = RsaSigningKey::from_pem(KEY_PKCS8_PEM).unwrap();
        let digest = Digest512::of(b"signed info");
        let sig = sk.sign_digest(&digest).unwrap();
        assert_eq!(sig.len(), 256);
        assert!(sk.verifying_key().verify_digest(&digest, &sig).is_ok());
    }

    #[test]
    fn signature_is_deterministic() {
        let sk = RsaSigningKey::from_pem(KEY_PKCS1_PEM).unwrap();
        let digest = Digest512::of(b"same input");
        assert_eq!(sk.sign_digest(&digest).unwrap(), sk.sign_digest(&digest).unwrap());
    }

    #[test]
    fn verify_fails_on_wrong_digest() {
        let sk = RsaSigningKey::from_pem(KEY_PKCS8_PEM).unwrap();
        let sig = sk.sign_digest(&Digest512::of(b"correct")).unwrap();
        let err = sk
            .verifying_key()
            .verify_digest(&Digest512::of(b"tampered"), &sig)
            .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidSignature));
    }

    #[test]
    fn verify_fails_with_wrong_key() {
        let sk = RsaSigningKey::from_pem(KEY_PKCS8_PEM).unwrap();
        let other = RsaSigningKey::from_pem(OTHER_KEY_PKCS8_PEM).unwrap();
        let digest = Digest512::of(b"message");
        let sig = sk.sign_digest(&digest).unwrap();
        assert!(other.verifying_key().verify_digest(&digest, &sig).is_err());
    }

    #[test]
    fn debug_redacts_signing_key() {
        let sk = RsaSigningKey::from_pem(KEY_PKCS8_PEM).unwrap();
        let debug = format!("{sk:?}");
        assert!(debug.contains("redacted"));
    }
}

use std::path::Path;

use crate::certificate::Certificate;
use crate::error::{CryptoError, CryptoResult};
use crate::signer::RsaSigningKey;

/// A client certificate paired with its private key.
///
/// Construction checks that the key actually belongs to the certificate,
/// so a loaded `KeyMaterial` always produces verifiable signatures.
#[derive(Debug)]
pub struct KeyMaterial {
    certificate: Certificate,
    signing_key: RsaSigningKey,
}

impl KeyMaterial {
    pub fn new(certificate: Certificate, signing_key: RsaSigningKey) -> CryptoResult<Self> {
        if &signing_key.verifying_key() != certificate.public_key() {
            return Err(CryptoError::KeyMismatch);
        }
        Ok(Self {
            certificate,
            signing_key,
        })
    }

    /// Load from PEM text. Either input being absent is a configuration error.
    pub fn from_pem_strings(
        certificate_pem: Option<&str>,
        private_key_pem: Option<&str>,
    ) -> CryptoResult<Self> {
        let cert_pem = certificate_pem
            .filter(|s| !s.trim().is_empty())
            .ok_or(CryptoError::MissingMaterial("certificate"))?;
        let key_pem = private_key_pem
            .filter(|s| !s.trim().is_empty())
            .ok_or(CryptoError::MissingMaterial("private key"))?;
        let certificate = Certificate::from_pem(cert_pem)?;
        let signing_key = RsaSigningKey::from_pem(key_pem)?;
        let material = Self::new(certificate, signing_key)?;
        tracing::debug!(
            subject = %material.certificate.subject(),
            not_after = %material.certificate.not_after(),
            "loaded key material"
        );
        Ok(material)
    }

    pub fn from_pem_files(certificate_path: &Path, private_key_path: &Path) -> CryptoResult<Self> {
        let cert = read_pem(certificate_path)?;
        let key = read_pem(private_key_path)?;
        Self::from_pem_strings(Some(&cert), Some(&key))
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn signing_key(&self) -> &RsaSigningKey {
        &self.signing_key
    }
}

fn read_pem(path: &Path) -> CryptoResult<String> {
    std::fs::read_to_string(path).map_err(|source| CryptoError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;

    #[test]
    fn matching_pair_loads() {
        let m = KeyMaterial::from_pem_strings(Some(CERT_PEM), Some(KEY_PKCS1_PEM)).unwrap();
        assert!(m.certificate().subject().contains("trdm-client.test"));
    }

    #[test]
    fn missing_certificate_is_reported() {
        let err = KeyMaterial::from_pem_strings(None, Some(KEY_PKCS8_PEM)).unwrap_err();
        assert!(matches!(err, CryptoError::MissingMaterial("certificate")));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let err = KeyMaterial::from_pem_strings(Some(CERT_PEM), Some("  \n")).unwrap_err();
        assert!(matches!(err, CryptoError::MissingMaterial("private key")));
    }

    #[test]
    fn mismatched_key_rejected() {
        let err = KeyMaterial::from_pem_strings(Some(CERT_PEM), Some(OTHER_KEY_PKCS8_PEM))
            .unwrap_err();
        assert!(matches!(err, CryptoError::KeyMismatch));
    }

    #[test]
    fn loads_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, CERT_PEM).unwrap();
        std::fs::write(&key_path, KEY_PKCS8_PEM).unwrap();
        assert!(KeyMaterial::from_pem_files(&cert_path, &key_path).is_ok());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = KeyMaterial::from_pem_files(&dir.path().join("nope.pem"), &dir.path().join("k"))
            .unwrap_err();
        assert!(matches!(err, CryptoError::Io { .. }));
    }
}

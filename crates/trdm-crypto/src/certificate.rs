use chrono::{DateTime, Utc};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::{CryptoError, CryptoResult};
use crate::signer::RsaVerifyingKey;

/// An X.509 client certificate, carried as a `BinarySecurityToken`.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    not_after: DateTime<Utc>,
    public_key: RsaVerifyingKey,
}

impl Certificate {
    /// Parse a PEM `CERTIFICATE` block. Leading text before the block is ignored.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let (_, block) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
            .map_err(|e| CryptoError::InvalidCertificate(format!("PEM: {e}")))?;
        if block.label != "CERTIFICATE" {
            return Err(CryptoError::InvalidCertificate(format!(
                "expected CERTIFICATE block, found {}",
                block.label
            )));
        }
        Self::from_der(block.contents)
    }

    pub fn from_der(der: Vec<u8>) -> CryptoResult<Self> {
        let (subject, not_after, spki) = {
            let (_, cert) = X509Certificate::from_der(&der)
                .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
            let ts = cert.validity().not_after.timestamp();
            let not_after = DateTime::<Utc>::from_timestamp(ts, 0).ok_or_else(|| {
                CryptoError::InvalidCertificate(format!("notAfter out of range: {ts}"))
            })?;
            (
                cert.subject().to_string(),
                not_after,
                cert.public_key().raw.to_vec(),
            )
        };
        let public_key = RsaVerifyingKey::from_spki_der(&spki)?;
        Ok(Self {
            der,
            subject,
            not_after,
            public_key,
        })
    }

    /// Raw DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Base64 of the DER encoding, as placed in `BinarySecurityToken`.
    pub fn to_base64(&self) -> String {
        crate::encode_base64(&self.der)
    }

    pub fn public_key(&self) -> &RsaVerifyingKey {
        &self.public_key
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at > self.not_after
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("not_after", &self.not_after)
            .finish()
    }
}

//! WS-Security for TRDM SOAP requests.
//!
//! Builds the SOAP 1.2 envelope with a `wsse:Security` header carrying an
//! X.509 `BinarySecurityToken`, a `wsu:Timestamp`, and an XML-DSig
//! `Signature` whose three references (timestamp, token, body) are digested
//! with SHA-512 over their exclusive canonical form and signed RSA-SHA512.
//!
//! Construction is phased: [`EnvelopeBuilder`] yields an unsigned skeleton,
//! [`Envelope::digest`] fills every `DigestValue`, and [`Envelope::sign`]
//! installs `SignatureValue`. Only the signed phase serializes.

pub mod c14n;
pub mod dsig;
pub mod envelope;
pub mod error;
pub mod ns;
pub mod xml;

pub use envelope::{
    format_wsu_time, Digested, Envelope, EnvelopeBuilder, EnvelopeIds, Signed, SignedEnvelope,
    Timestamp, Unsigned, DEFAULT_VALIDITY,
};
pub use error::{WsseError, WsseResult};
pub use xml::{Element, Node, QName};

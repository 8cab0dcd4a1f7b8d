//! Namespace and token-profile URIs used in the security header.

pub const SOAP12: &str = "http://www.w3.org/2003/05/soap-envelope";

pub const WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

pub const WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

pub const DS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Namespace of `ec:InclusiveNamespaces`, same URI as the algorithm itself.
pub const EC: &str = trdm_crypto::algorithm::EXC_C14N;

/// Implicitly bound to the `xml` prefix; never declared.
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

pub const BASE64_BINARY: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

pub const X509_V3: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";

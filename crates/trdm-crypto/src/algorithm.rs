//! Algorithm identifiers advertised in XML-DSig `SignedInfo`.

/// Exclusive XML canonicalization without comments.
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// SHA-512 digest method.
pub const DIGEST_SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

/// RSA PKCS#1 v1.5 over SHA-512. Must agree with [`DIGEST_SHA512`].
pub const SIGNATURE_RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";

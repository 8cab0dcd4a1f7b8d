//! XML-DSig plumbing over an element tree: locating `SignedInfo`,
//! computing and checking reference digests, and verifying the signature.

use trdm_crypto::{Certificate, Digest512};

use crate::c14n;
use crate::error::{WsseError, WsseResult};
use crate::xml::Element;

/// Path to the first `Signature/SignedInfo` in the document.
pub fn signed_info_path(root: &Element) -> WsseResult<Vec<usize>> {
    root.find_path(&|e| {
        e.name().local() == "SignedInfo"
            && e.child("CanonicalizationMethod").is_some()
    })
    .ok_or_else(|| WsseError::MissingElement("SignedInfo".into()))
}

/// Path to the `Signature` element that holds `SignedInfo`.
pub fn signature_path(root: &Element) -> WsseResult<Vec<usize>> {
    let mut path = signed_info_path(root)?;
    path.pop();
    Ok(path)
}

/// Reference target id with the leading `#` removed.
pub fn reference_target(reference: &Element) -> WsseResult<&str> {
    let uri = reference
        .attr("URI")
        .ok_or_else(|| WsseError::MissingElement("Reference/@URI".into()))?;
    uri.strip_prefix('#')
        .filter(|id| !id.is_empty())
        .ok_or_else(|| WsseError::UnsupportedReference(uri.to_string()))
}

/// `PrefixList` of the exclusive-c14n transform on a reference.
pub fn reference_prefixes(reference: &Element) -> Vec<String> {
    reference
        .descend(&["Transforms", "Transform", "InclusiveNamespaces"])
        .and_then(|inc| inc.attr("PrefixList"))
        .map(c14n::parse_prefix_list)
        .unwrap_or_default()
}

/// Canonical bytes of `SignedInfo`, using its own `CanonicalizationMethod`
/// prefix list.
pub fn canonical_signed_info(root: &Element) -> WsseResult<Vec<u8>> {
    let path = signed_info_path(root)?;
    let signed_info = root
        .at_path(&path)
        .ok_or_else(|| WsseError::MissingElement("SignedInfo".into()))?;
    let prefixes = signed_info
        .descend(&["CanonicalizationMethod", "InclusiveNamespaces"])
        .and_then(|inc| inc.attr("PrefixList"))
        .map(c14n::parse_prefix_list)
        .unwrap_or_default();
    c14n::canonicalize(root, &path, &prefixes)
}

/// Digest the element a reference points at.
pub fn digest_reference(root: &Element, reference: &Element) -> WsseResult<Digest512> {
    let target = reference_target(reference)?;
    c14n::digest_by_id(root, target, &reference_prefixes(reference))
}

/// Check every reference digest and the signature value.
///
/// Each reference must resolve to exactly one element; the recomputed
/// digest must match `DigestValue`; `SignatureValue` must verify against
/// the certificate's public key over the canonical `SignedInfo`.
pub fn verify(root: &Element, certificate: &Certificate) -> WsseResult<()> {
    let si_path = signed_info_path(root)?;
    let signed_info = root
        .at_path(&si_path)
        .ok_or_else(|| WsseError::MissingElement("SignedInfo".into()))?;

    let mut checked = 0usize;
    for reference in signed_info
        .child_elements()
        .filter(|e| e.name().local() == "Reference")
    {
        let expected_text = reference
            .child("DigestValue")
            .map(|d| d.text())
            .ok_or_else(|| WsseError::MissingElement("Reference/DigestValue".into()))?;
        let expected = Digest512::from_base64(&expected_text)?;
        let actual = digest_reference(root, reference)?;
        if actual != expected {
            return Err(WsseError::DigestMismatch {
                uri: reference.attr("URI").unwrap_or_default().to_string(),
            });
        }
        checked += 1;
    }
    if checked == 0 {
        return Err(WsseError::MissingElement("SignedInfo/Reference".into()));
    }

    let mut sig_path = si_path;
    sig_path.pop();
    let signature_value = root
        .at_path(&sig_path)
        .and_then(|sig| sig.child("SignatureValue"))
        .map(|v| v.text())
        .ok_or_else(|| WsseError::MissingElement("SignatureValue".into()))?;
    let signature = trdm_crypto::decode_base64(&signature_value)?;

    let digest = Digest512::of(&canonical_signed_info(root)?);
    certificate.public_key().verify_digest(&digest, &signature)?;
    tracing::debug!(references = checked, "signature verified");
    Ok(())
}

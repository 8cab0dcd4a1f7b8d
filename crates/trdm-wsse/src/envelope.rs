//! WS-Security envelope construction with explicit build phases.
//!
//! An envelope moves `Unsigned -> Digested -> Signed`. Only a
//! [`SignedEnvelope`] can be serialized, so a request without a complete
//! signature cannot reach the wire.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;
use trdm_crypto::algorithm::{DIGEST_SHA512, EXC_C14N, SIGNATURE_RSA_SHA512};
use trdm_crypto::{generate_id, Certificate, Digest512, IdPrefix, KeyMaterial, RsaSigningKey};

use crate::c14n;
use crate::dsig;
use crate::error::{WsseError, WsseResult};
use crate::ns;
use crate::xml::Element;

/// Default `Timestamp` window.
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(300);

const SIGNED_INFO_PREFIXES: &str = "ret soap";
const TIMESTAMP_PREFIXES: &str = "wsse ret soap";
const TOKEN_PREFIXES: &str = "";
const BODY_PREFIXES: &str = "ret";

/// Envelope phase markers.
#[derive(Debug)]
pub struct Unsigned;
#[derive(Debug)]
pub struct Digested;
#[derive(Debug)]
pub struct Signed;

pub type SignedEnvelope = Envelope<Signed>;

/// Element ids assigned when the skeleton is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeIds {
    pub body: String,
    pub binary_security_token: String,
    pub timestamp: String,
    pub signature: String,
    pub key_info: String,
    pub security_token_reference: String,
}

impl EnvelopeIds {
    fn allocate() -> Self {
        let mut seen = HashSet::new();
        let mut fresh = |prefix: &str| loop {
            let id = generate_id(prefix);
            if seen.insert(id.clone()) {
                return id;
            }
        };
        Self {
            body: fresh(IdPrefix::BODY),
            binary_security_token: fresh(IdPrefix::X509),
            timestamp: fresh(IdPrefix::TIMESTAMP),
            signature: fresh(IdPrefix::SIGNATURE),
            key_info: fresh(IdPrefix::KEY_INFO),
            security_token_reference: fresh(IdPrefix::SECURITY_TOKEN_REF),
        }
    }

    /// Signed targets in `SignedInfo` order, with their transform prefix lists.
    fn references(&self) -> [(&str, &'static str); 3] {
        [
            (self.timestamp.as_str(), TIMESTAMP_PREFIXES),
            (self.binary_security_token.as_str(), TOKEN_PREFIXES),
            (self.body.as_str(), BODY_PREFIXES),
        ]
    }
}

/// The `wsu:Timestamp` window, at millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl Timestamp {
    fn new(created: DateTime<Utc>, validity: Duration) -> WsseResult<Self> {
        let millis = i64::try_from(validity.as_millis()).map_err(|_| WsseError::InvalidValidity)?;
        if millis <= 0 {
            return Err(WsseError::InvalidValidity);
        }
        let created = DateTime::<Utc>::from_timestamp_millis(created.timestamp_millis())
            .ok_or(WsseError::TimestampOutOfRange)?;
        let expires = TimeDelta::try_milliseconds(millis)
            .and_then(|delta| created.checked_add_signed(delta))
            .ok_or(WsseError::TimestampOutOfRange)?;
        Ok(Self { created, expires })
    }

    pub fn validity(&self) -> TimeDelta {
        self.expires - self.created
    }

    /// `created <= now < expires`.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.created <= now && now < self.expires
    }
}

/// `2020-01-27T16:14:20.000Z`
pub fn format_wsu_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Builds the envelope skeleton for one outbound request.
#[derive(Debug)]
pub struct EnvelopeBuilder<'a> {
    material: &'a KeyMaterial,
    validity: Duration,
    created: Option<DateTime<Utc>>,
    namespaces: Vec<(String, String)>,
}

impl<'a> EnvelopeBuilder<'a> {
    pub fn new(material: &'a KeyMaterial) -> Self {
        Self {
            material,
            validity: DEFAULT_VALIDITY,
            created: None,
            namespaces: Vec::new(),
        }
    }

    pub fn validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Fix the `Created` instant instead of reading the clock.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created = Some(at);
        self
    }

    /// Declare an extra namespace on `soap:Envelope` (e.g. the payload's).
    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.push((prefix.to_string(), uri.to_string()));
        self
    }

    /// Assemble the skeleton around `payload` with empty digests and an
    /// empty signature value.
    pub fn build(self, payload: Element) -> WsseResult<Envelope<Unsigned>> {
        let timestamp = Timestamp::new(self.created.unwrap_or_else(Utc::now), self.validity)?;
        let ids = EnvelopeIds::allocate();
        let certificate = self.material.certificate();

        let security = Element::new("wsse:Security")
            .with_namespace("wsse", ns::WSSE)
            .with_namespace("wsu", ns::WSU)
            .with_child(binary_security_token(&ids, certificate))
            .with_child(signature_skeleton(&ids))
            .with_child(timestamp_element(&ids, &timestamp));

        let body = Element::new("soap:Body")
            .with_namespace("wsu", ns::WSU)
            .with_attr("wsu:Id", ids.body.as_str())
            .with_child(payload);

        let mut root = Element::new("soap:Envelope").with_namespace("soap", ns::SOAP12);
        for (prefix, uri) in &self.namespaces {
            root.declare_namespace(prefix, uri);
        }
        let root = root
            .with_child(Element::new("soap:Header").with_child(security))
            .with_child(body);

        debug!(
            body_id = %ids.body,
            token_id = %ids.binary_security_token,
            timestamp_id = %ids.timestamp,
            expires = %format_wsu_time(timestamp.expires),
            "built envelope skeleton"
        );

        Ok(Envelope {
            root,
            ids,
            timestamp,
            state: PhantomData,
        })
    }

    /// Build, digest, and sign in one go.
    pub fn build_signed(self, payload: Element) -> WsseResult<SignedEnvelope> {
        let key = self.material.signing_key();
        self.build(payload)?.digest()?.sign(key)
    }
}

fn binary_security_token(ids: &EnvelopeIds, certificate: &Certificate) -> Element {
    Element::new("wsse:BinarySecurityToken")
        .with_attr("EncodingType", ns::BASE64_BINARY)
        .with_attr("ValueType", ns::X509_V3)
        .with_attr("wsu:Id", ids.binary_security_token.as_str())
        .with_text(certificate.to_base64())
}

fn inclusive_namespaces(prefixes: &str) -> Element {
    Element::new("ec:InclusiveNamespaces")
        .with_namespace("ec", ns::EC)
        .with_attr("PrefixList", prefixes)
}

fn reference(target: &str, prefixes: &str) -> Element {
    Element::new("ds:Reference")
        .with_attr("URI", format!("#{target}"))
        .with_child(
            Element::new("ds:Transforms").with_child(
                Element::new("ds:Transform")
                    .with_attr("Algorithm", EXC_C14N)
                    .with_child(inclusive_namespaces(prefixes)),
            ),
        )
        .with_child(Element::new("ds:DigestMethod").with_attr("Algorithm", DIGEST_SHA512))
        .with_child(Element::new("ds:DigestValue"))
}

fn signature_skeleton(ids: &EnvelopeIds) -> Element {
    let mut signed_info = Element::new("ds:SignedInfo")
        .with_child(
            Element::new("ds:CanonicalizationMethod")
                .with_attr("Algorithm", EXC_C14N)
                .with_child(inclusive_namespaces(SIGNED_INFO_PREFIXES)),
        )
        .with_child(Element::new("ds:SignatureMethod").with_attr("Algorithm", SIGNATURE_RSA_SHA512));
    for (target, prefixes) in ids.references() {
        signed_info.push_child(reference(target, prefixes));
    }

    let key_info = Element::new("ds:KeyInfo")
        .with_attr("Id", ids.key_info.as_str())
        .with_child(
            Element::new("wsse:SecurityTokenReference")
                .with_attr("wsu:Id", ids.security_token_reference.as_str())
                .with_child(
                    Element::new("wsse:Reference")
                        .with_attr("URI", format!("#{}", ids.binary_security_token))
                        .with_attr("ValueType", ns::X509_V3),
                ),
        );

    Element::new("ds:Signature")
        .with_namespace("ds", ns::DS)
        .with_attr("Id", ids.signature.as_str())
        .with_child(signed_info)
        .with_child(Element::new("ds:SignatureValue"))
        .with_child(key_info)
}

fn timestamp_element(ids: &EnvelopeIds, ts: &Timestamp) -> Element {
    Element::new("wsu:Timestamp")
        .with_attr("wsu:Id", ids.timestamp.as_str())
        .with_child(Element::new("wsu:Created").with_text(format_wsu_time(ts.created)))
        .with_child(Element::new("wsu:Expires").with_text(format_wsu_time(ts.expires)))
}

/// A SOAP envelope in build phase `S`. Not `Clone`: each envelope is
/// built for exactly one request.
#[derive(Debug)]
#[must_use]
pub struct Envelope<S> {
    root: Element,
    ids: EnvelopeIds,
    timestamp: Timestamp,
    state: PhantomData<S>,
}

impl<S> Envelope<S> {
    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn ids(&self) -> &EnvelopeIds {
        &self.ids
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    fn into_phase<T>(self) -> Envelope<T> {
        Envelope {
            root: self.root,
            ids: self.ids,
            timestamp: self.timestamp,
            state: PhantomData,
        }
    }
}

impl Envelope<Unsigned> {
    /// Fill each `Reference/DigestValue` from the canonical form of its
    /// target. Timestamp, token, and body are all final at this point.
    pub fn digest(mut self) -> WsseResult<Envelope<Digested>> {
        let si_path = dsig::signed_info_path(&self.root)?;
        for (target, prefixes) in self.ids.references() {
            let digest = c14n::digest_by_id(&self.root, target, &c14n::parse_prefix_list(prefixes))?;
            let uri = format!("#{target}");
            let slot = self
                .root
                .at_path_mut(&si_path)
                .and_then(|si| {
                    si.child_elements_mut()
                        .find(|r| r.name().local() == "Reference" && r.attr("URI") == Some(uri.as_str()))
                })
                .and_then(|r| r.child_mut("DigestValue"))
                .ok_or_else(|| WsseError::MissingElement(format!("DigestValue for {uri}")))?;
            slot.set_text(digest.to_base64());
            debug!(reference = %uri, digest = ?digest, "reference digested");
        }
        Ok(self.into_phase())
    }
}

impl Envelope<Digested> {
    /// Sign the SHA-512 digest of canonical `SignedInfo` and install the
    /// base64 signature value.
    pub fn sign(mut self, key: &RsaSigningKey) -> WsseResult<Envelope<Signed>> {
        let digest = Digest512::of(&dsig::canonical_signed_info(&self.root)?);
        let signature = key.sign_digest(&digest)?;
        let sig_path = dsig::signature_path(&self.root)?;
        let slot = self
            .root
            .at_path_mut(&sig_path)
            .and_then(|sig| sig.child_mut("SignatureValue"))
            .ok_or_else(|| WsseError::MissingElement("SignatureValue".into()))?;
        slot.set_text(trdm_crypto::encode_base64(&signature));
        debug!(signature_id = %self.ids.signature, "envelope signed");
        Ok(self.into_phase())
    }
}

impl Envelope<Signed> {
    /// Serialize for transmission.
    pub fn to_xml(&self) -> String {
        self.root.to_xml_string()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.to_xml().into_bytes()
    }

    /// Recompute every reference digest and check the signature.
    pub fn verify(&self, certificate: &Certificate) -> WsseResult<()> {
        dsig::verify(&self.root, certificate)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.timestamp.contains(now)
    }
}

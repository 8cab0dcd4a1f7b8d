//! AWS Signature Version 4 request signing.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, HOST};
use http::{Method, Request};
use sha2::{Digest, Sha256};

use crate::credentials::TemporaryCredentials;
use crate::error::{GatewayError, GatewayResult};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const DEFAULT_SERVICE: &str = "execute-api";

const X_AMZ_DATE: &str = "x-amz-date";
const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";
const X_AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";

/// Signs requests for one region and service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigV4Signer {
    region: String,
    service: String,
    content_sha256_header: bool,
}

impl SigV4Signer {
    /// A signer for API gateway (`execute-api`) requests in `region`.
    pub fn new(region: impl Into<String>) -> Self {
        Self::for_service(region, DEFAULT_SERVICE)
    }

    pub fn for_service(region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
            content_sha256_header: false,
        }
    }

    /// Also send and sign `x-amz-content-sha256`.
    pub fn with_content_sha256_header(mut self, enabled: bool) -> Self {
        self.content_sha256_header = enabled;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Capture everything a single signed call needs.
    pub fn prepare(
        &self,
        method: Method,
        url: impl Into<String>,
        body: Vec<u8>,
        credentials: TemporaryCredentials,
        signed_at: DateTime<Utc>,
    ) -> GatewayRequest {
        GatewayRequest {
            method,
            url: url.into(),
            payload_hash: hex_sha256(&body),
            body,
            content_type: None,
            region: self.region.clone(),
            credentials,
            signed_at,
        }
    }

    /// Sign `request` in place.
    ///
    /// Adds `host`, `x-amz-date`, `x-amz-security-token` (when the
    /// credentials carry one), optionally `x-amz-content-sha256`, and
    /// finally `authorization`. Every header present before the call is
    /// part of the signature.
    pub fn sign(
        &self,
        request: &mut Request<Vec<u8>>,
        credentials: &TemporaryCredentials,
        signed_at: DateTime<Utc>,
    ) -> GatewayResult<()> {
        let amz_date = signed_at.format("%Y%m%dT%H%M%SZ").to_string();
        let date = signed_at.format("%Y%m%d").to_string();
        let payload_hash = hex_sha256(request.body());

        let host = request
            .uri()
            .authority()
            .map(|a| a.as_str().to_string())
            .ok_or_else(|| GatewayError::InvalidRequest(format!("URL has no host: {}", request.uri())))?;
        let headers = request.headers_mut();
        headers.remove(AUTHORIZATION);
        if !headers.contains_key(HOST) {
            headers.insert(HOST, header_value(&host)?);
        }
        headers.insert(HeaderName::from_static(X_AMZ_DATE), header_value(&amz_date)?);
        match &credentials.session_token {
            Some(token) => {
                headers.insert(HeaderName::from_static(X_AMZ_SECURITY_TOKEN), header_value(token)?);
            }
            None => {
                headers.remove(X_AMZ_SECURITY_TOKEN);
            }
        }
        if self.content_sha256_header {
            headers.insert(
                HeaderName::from_static(X_AMZ_CONTENT_SHA256),
                header_value(&payload_hash)?,
            );
        }

        let (canonical, signed_headers) = canonical_request(request, &payload_hash)?;
        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex_sha256(canonical.as_bytes())
        );
        let key = signing_key(&credentials.secret_access_key, &date, &self.region, &self.service)?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        );
        request
            .headers_mut()
            .insert(AUTHORIZATION, header_value(&authorization)?);
        tracing::debug!(
            service = %self.service,
            region = %self.region,
            signed_headers = %signed_headers,
            "signed request"
        );
        Ok(())
    }
}

/// One signed gateway call: built, signed, sent, and discarded.
#[derive(Clone, Debug)]
pub struct GatewayRequest {
    pub method: Method,
    pub url: String,
    pub body: Vec<u8>,
    /// Hex SHA-256 of `body`.
    pub payload_hash: String,
    pub content_type: Option<String>,
    pub region: String,
    pub credentials: TemporaryCredentials,
    pub signed_at: DateTime<Utc>,
}

impl GatewayRequest {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Build the signed HTTP request. Fails rather than returning an
    /// unsigned request.
    pub fn into_signed(self, signer: &SigV4Signer) -> GatewayResult<Request<Vec<u8>>> {
        if signer.region() != self.region {
            return Err(GatewayError::Signing(format!(
                "request prepared for region {} but signer is for {}",
                self.region,
                signer.region()
            )));
        }
        let mut builder = Request::builder().method(self.method).uri(self.url.as_str());
        if let Some(ct) = &self.content_type {
            builder = builder.header(CONTENT_TYPE, ct.as_str());
        }
        let mut request = builder
            .body(self.body)
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
        self.credentials.ensure_valid_at(self.signed_at)?;
        signer.sign(&mut request, &self.credentials, self.signed_at)?;
        Ok(request)
    }
}

/// The canonical request and its `SignedHeaders` list.
pub fn canonical_request<B>(request: &Request<B>, payload_hash: &str) -> GatewayResult<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for name in request.headers().keys() {
        if *name == AUTHORIZATION {
            continue;
        }
        let values = request
            .headers()
            .get_all(name)
            .iter()
            .map(|v| {
                v.to_str()
                    .map(normalize_header_value)
                    .map_err(|_| GatewayError::InvalidRequest(format!("non-ASCII value in header {name}")))
            })
            .collect::<GatewayResult<Vec<_>>>()?;
        headers.push((name.as_str().to_ascii_lowercase(), values.join(",")));
    }
    headers.sort();

    let canonical_headers: String = headers.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();
    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method().as_str(),
        canonical_uri(request.uri().path()),
        canonical_query(request.uri().query().unwrap_or_default()),
        canonical_headers,
        signed_headers,
        payload_hash
    );
    Ok((canonical, signed_headers))
}

/// Each path segment URI-encoded; empty path becomes `/`.
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/').map(|seg| uri_encode(seg, true)).collect::<Vec<_>>().join("/")
}

/// Query parameters decoded, re-encoded, and sorted by name then value.
pub fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let (k, v) = p.split_once('=').unwrap_or((p, ""));
            (uri_encode(&percent_decode(k), true), uri_encode(&percent_decode(v), true))
        })
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// RFC 3986 encoding; unreserved characters pass through.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(v) => {
                        out.push(v);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `kSigning` derived from the secret, date, region, and service.
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> GatewayResult<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> GatewayResult<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| GatewayError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn header_value(value: &str) -> GatewayResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
}

//! Role assumption through the STS query API.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use http::Method;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::credentials::{CredentialProvider, TemporaryCredentials};
use crate::error::{GatewayError, GatewayResult};
use crate::sigv4::{uri_encode, SigV4Signer};

pub const STS_VERSION: &str = "2011-06-15";
pub const DEFAULT_DURATION_SECS: u32 = 3600;

/// Cached credentials are refreshed this many seconds before they expire.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Parameters of the `AssumeRole` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssumeRoleConfig {
    pub role_arn: String,
    pub role_session_name: String,
    /// e.g. `https://sts.us-gov-west-1.amazonaws.com/`
    pub sts_endpoint: String,
    pub region: String,
    pub duration_secs: u32,
}

impl AssumeRoleConfig {
    /// Form-encoded `AssumeRole` request body.
    pub fn form_body(&self) -> String {
        [
            ("Action", "AssumeRole".to_string()),
            ("DurationSeconds", self.duration_secs.to_string()),
            ("RoleArn", self.role_arn.clone()),
            ("RoleSessionName", self.role_session_name.clone()),
            ("Version", STS_VERSION.to_string()),
        ]
        .iter()
        .map(|(k, v)| format!("{k}={}", uri_encode(v, true)))
        .collect::<Vec<_>>()
        .join("&")
    }
}

/// Holds one set of credentials and refreshes it when close to expiry.
///
/// Concurrent callers wait on the same refresh instead of each starting
/// their own.
#[derive(Debug, Default)]
pub struct CredentialCache {
    slot: Mutex<Option<TemporaryCredentials>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_refresh<F, Fut>(&self, now: DateTime<Utc>, refresh: F) -> GatewayResult<TemporaryCredentials>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<TemporaryCredentials>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if !cached.expires_within(now, TimeDelta::seconds(REFRESH_MARGIN_SECS)) {
                return Ok(cached.clone());
            }
            debug!(access_key_id = %cached.access_key_id, "cached credentials near expiry");
        }
        let fresh = refresh().await?;
        *slot = Some(fresh.clone());
        Ok(fresh)
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }
}

/// Assumes a role with source credentials and caches the result.
pub struct AssumeRoleProvider {
    config: AssumeRoleConfig,
    source: Arc<dyn CredentialProvider>,
    signer: SigV4Signer,
    http: reqwest::Client,
    cache: CredentialCache,
}

impl AssumeRoleProvider {
    pub fn new(
        config: AssumeRoleConfig,
        source: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        Ok(Self {
            signer: SigV4Signer::for_service(config.region.clone(), "sts"),
            config,
            source,
            http,
            cache: CredentialCache::new(),
        })
    }

    async fn assume_role(&self) -> GatewayResult<TemporaryCredentials> {
        let source = self.source.credentials().await?;
        let request = self
            .signer
            .prepare(
                Method::POST,
                self.config.sts_endpoint.as_str(),
                self.config.form_body().into_bytes(),
                source,
                Utc::now(),
            )
            .with_content_type("application/x-www-form-urlencoded; charset=utf-8")
            .into_signed(&self.signer)?;
        let request = reqwest::Request::try_from(request).map_err(|e| GatewayError::Http(e.to_string()))?;

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| GatewayError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::Sts {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }
        let credentials = parse_assume_role_response(&body)?;
        info!(
            role_arn = %self.config.role_arn,
            access_key_id = %credentials.access_key_id,
            expiration = ?credentials.expiration,
            "assumed role"
        );
        Ok(credentials)
    }
}

#[async_trait]
impl CredentialProvider for AssumeRoleProvider {
    async fn credentials(&self) -> GatewayResult<TemporaryCredentials> {
        self.cache.get_or_refresh(Utc::now(), || self.assume_role()).await
    }
}

/// Pull the `Credentials` block out of an `AssumeRoleResponse`.
pub fn parse_assume_role_response(body: &str) -> GatewayResult<TemporaryCredentials> {
    let root = trdm_wsse::xml::parse(body)?;
    let creds = root
        .find_local("Credentials")
        .ok_or_else(|| GatewayError::StsResponse("no Credentials element".into()))?;
    let field = |name: &str| {
        creds
            .child(name)
            .map(|e| e.text().trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::StsResponse(format!("Credentials/{name} missing")))
    };
    let expiration = field("Expiration")?;
    let expiration = DateTime::parse_from_rfc3339(&expiration)
        .map_err(|e| GatewayError::StsResponse(format!("bad Expiration {expiration:?}: {e}")))?
        .with_timezone(&Utc);
    Ok(TemporaryCredentials::new(field("AccessKeyId")?, field("SecretAccessKey")?)
        .with_session_token(field("SessionToken")?)
        .with_expiration(expiration))
}

fn excerpt(body: &str) -> String {
    const MAX: usize = 512;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RESPONSE: &str = r#"<AssumeRoleResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleResult>
    <AssumedRoleUser>
      <Arn>arn:aws-us-gov:sts::123456789012:assumed-role/trdm/sync</Arn>
      <AssumedRoleId>AROA3XFRBF535PLBIFPI4:sync</AssumedRoleId>
    </AssumedRoleUser>
    <Credentials>
      <AccessKeyId>ASIAJEXAMPLEXEG2JICEA</AccessKeyId>
      <SecretAccessKey>9drTJvcXLB89EXAMPLELB8923FB892xMFI</SecretAccessKey>
      <SessionToken>AQoXdzELDDY//////////wEaoAK1wvxJY12r2IrDFT2IvAzTCn3zHoZ7</SessionToken>
      <Expiration>2024-03-01T11:00:00Z</Expiration>
    </Credentials>
  </AssumeRoleResult>
  <ResponseMetadata>
    <RequestId>c6104cbe-af31-11e0-8154-cbc7ccf896c7</RequestId>
  </ResponseMetadata>
</AssumeRoleResponse>"#;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn parses_credentials_block() {
        let creds = parse_assume_role_response(RESPONSE).unwrap();
        assert_eq!(creds.access_key_id, "ASIAJEXAMPLEXEG2JICEA");
        assert_eq!(creds.secret_access_key, "9drTJvcXLB89EXAMPLELB8923FB892xMFI");
        assert!(creds.session_token.as_deref().unwrap().starts_with("AQoXdzELDDY"));
        assert_eq!(creds.expiration, Some(at("2024-03-01T11:00:00Z")));
    }

    #[test]
    fn missing_field_is_reported() {
        let body = RESPONSE.replace("<SessionToken>", "<Other>").replace("</SessionToken>", "</Other>");
        assert!(matches!(
            parse_assume_role_response(&body),
            Err(GatewayError::StsResponse(msg)) if msg.contains("SessionToken")
        ));
        assert!(matches!(
            parse_assume_role_response("<ErrorResponse/>"),
            Err(GatewayError::StsResponse(_))
        ));
        assert!(matches!(parse_assume_role_response("<x"), Err(GatewayError::Xml(_))));
    }

    #[test]
    fn form_body_is_encoded() {
        let config = AssumeRoleConfig {
            role_arn: "arn:aws:iam::123456789012:role/trdm".into(),
            role_session_name: "sync".into(),
            sts_endpoint: "https://sts.amazonaws.com/".into(),
            region: "us-east-1".into(),
            duration_secs: 900,
        };
        assert_eq!(
            config.form_body(),
            "Action=AssumeRole&DurationSeconds=900\
             &RoleArn=arn%3Aaws%3Aiam%3A%3A123456789012%3Arole%2Ftrdm\
             &RoleSessionName=sync&Version=2011-06-15"
        );
    }

    #[tokio::test]
    async fn cache_reuses_until_margin() {
        let cache = CredentialCache::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let refresh = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(TemporaryCredentials::new("AKID", "s").with_expiration(at("2024-03-01T11:00:00Z")))
        };

        cache.get_or_refresh(at("2024-03-01T10:00:00Z"), refresh).await.unwrap();
        cache.get_or_refresh(at("2024-03-01T10:58:59Z"), refresh).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.get_or_refresh(at("2024-03-01T10:59:30Z"), refresh).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.clear().await;
        cache.get_or_refresh(at("2024-03-01T10:00:00Z"), refresh).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_refresh_is_not_cached() {
        let cache = CredentialCache::new();
        let err = cache
            .get_or_refresh(at("2024-03-01T10:00:00Z"), || async {
                Err(GatewayError::Http("connection refused".into()))
            })
            .await;
        assert!(err.is_err());
        let ok = cache
            .get_or_refresh(at("2024-03-01T10:00:00Z"), || async {
                Ok(TemporaryCredentials::new("AKID", "s"))
            })
            .await
            .unwrap();
        assert_eq!(ok.access_key_id, "AKID");
    }
}

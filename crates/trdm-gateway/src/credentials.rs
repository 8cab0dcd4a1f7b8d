use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{GatewayError, GatewayResult};

pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// Short-lived signing credentials.
///
/// `Debug` never prints the secret or the session token.
#[derive(Clone, PartialEq, Eq)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl TemporaryCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expiration: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// `true` if these credentials expire before `now + margin`.
    /// Credentials without an expiration never expire.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        match self.expiration {
            Some(exp) => now.checked_add_signed(margin).map_or(true, |limit| exp <= limit),
            None => false,
        }
    }

    /// Reject credentials that are already expired at `now`.
    pub fn ensure_valid_at(&self, now: DateTime<Utc>) -> GatewayResult<()> {
        match self.expiration {
            Some(exp) if exp <= now => Err(GatewayError::CredentialsExpired {
                access_key_id: self.access_key_id.clone(),
                expired_at: exp.to_rfc3339(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Source of signing credentials.
///
/// Implementations must be safe to share between concurrently running
/// table cycles.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> GatewayResult<TemporaryCredentials>;
}

/// Always hands out the same credentials.
#[derive(Clone, Debug)]
pub struct StaticCredentialProvider {
    credentials: TemporaryCredentials,
}

impl StaticCredentialProvider {
    pub fn new(credentials: TemporaryCredentials) -> Self {
        Self { credentials }
    }

    /// Read `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the optional
    /// `AWS_SESSION_TOKEN` from the process environment.
    pub fn from_env() -> GatewayResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> GatewayResult<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let access_key_id = non_empty(ENV_ACCESS_KEY_ID)
            .ok_or_else(|| GatewayError::MissingCredentials(format!("{ENV_ACCESS_KEY_ID} is not set")))?;
        let secret_access_key = non_empty(ENV_SECRET_ACCESS_KEY).ok_or_else(|| {
            GatewayError::MissingCredentials(format!("{ENV_SECRET_ACCESS_KEY} is not set"))
        })?;
        let mut credentials = TemporaryCredentials::new(access_key_id, secret_access_key);
        credentials.session_token = non_empty(ENV_SESSION_TOKEN);
        Ok(Self::new(credentials))
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credentials(&self) -> GatewayResult<TemporaryCredentials> {
        self.credentials.ensure_valid_at(Utc::now())?;
        Ok(self.credentials.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = TemporaryCredentials::new("AKIDEXAMPLE", "super-secret").with_session_token("tok");
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("AKIDEXAMPLE"));
        assert!(!dbg.contains("super-secret"));
        assert!(!dbg.contains("tok\""));
    }

    #[test]
    fn expiry_margin() {
        let creds = TemporaryCredentials::new("a", "s").with_expiration(at("2024-01-01T00:01:00Z"));
        let margin = TimeDelta::seconds(60);
        assert!(!creds.expires_within(at("2023-12-31T23:59:59Z"), margin));
        assert!(creds.expires_within(at("2024-01-01T00:00:00Z"), margin));
        assert!(!TemporaryCredentials::new("a", "s").expires_within(at("2099-01-01T00:00:00Z"), margin));
    }

    #[test]
    fn expired_credentials_rejected() {
        let creds = TemporaryCredentials::new("a", "s").with_expiration(at("2024-01-01T00:00:00Z"));
        assert!(creds.ensure_valid_at(at("2023-12-31T00:00:00Z")).is_ok());
        assert!(matches!(
            creds.ensure_valid_at(at("2024-01-01T00:00:00Z")),
            Err(GatewayError::CredentialsExpired { .. })
        ));
    }

    #[test]
    fn lookup_requires_key_and_secret() {
        let env: HashMap<&str, &str> = [(ENV_ACCESS_KEY_ID, "AKID")].into_iter().collect();
        let err = StaticCredentialProvider::from_lookup(|k| env.get(k).map(|v| v.to_string()))
            .unwrap_err();
        assert!(matches!(err, GatewayError::MissingCredentials(msg) if msg.contains(ENV_SECRET_ACCESS_KEY)));
    }

    #[tokio::test]
    async fn static_provider_from_lookup() {
        let env: HashMap<&str, &str> = [
            (ENV_ACCESS_KEY_ID, "AKID"),
            (ENV_SECRET_ACCESS_KEY, "secret"),
            (ENV_SESSION_TOKEN, ""),
        ]
        .into_iter()
        .collect();
        let provider =
            StaticCredentialProvider::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        let creds = provider.credentials().await.unwrap();
        assert_eq!(creds.access_key_id, "AKID");
        assert!(creds.session_token.is_none());
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trdm_crypto::{CryptoError, KeyMaterial};
use trdm_gateway::AssumeRoleConfig;
use trdm_protocol::AuthMethod;
use trdm_types::TableIdentifier;

pub const ENV_CERTIFICATE_PEM: &str = "TRDM_CERTIFICATE_PEM";
pub const ENV_PRIVATE_KEY_PEM: &str = "TRDM_PRIVATE_KEY_PEM";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("key material: {0}")]
    KeyMaterial(#[from] CryptoError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Everything `trdm` reads from `trdm.toml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrdmConfig {
    pub soap: SoapConfig,
    pub credentials: CredentialsConfig,
    pub gateway: GatewayConfig,
    pub sync: SyncConfig,
    /// `tracing` filter directive; `RUST_LOG` wins when set.
    pub log_level: Option<String>,
    pub log_format: LogFormat,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoapConfig {
    pub url: String,
    pub timestamp_validity_secs: u64,
    pub request_timeout_secs: u64,
    pub soap_action: String,
    pub verify_before_send: bool,
}

impl Default for SoapConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timestamp_validity_secs: 300,
            request_timeout_secs: 30,
            soap_action: trdm_protocol::DEFAULT_SOAP_ACTION.to_string(),
            verify_before_send: true,
        }
    }
}

impl SoapConfig {
    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.timestamp_validity_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Certificate and private key, as paths or inline PEM. Inline wins.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub certificate_pem_path: Option<PathBuf>,
    pub private_key_pem_path: Option<PathBuf>,
    pub certificate_pem: Option<String>,
    pub private_key_pem: Option<String>,
}

impl CredentialsConfig {
    pub fn has_certificate(&self) -> bool {
        present(&self.certificate_pem) || self.certificate_pem_path.is_some()
    }

    pub fn has_private_key(&self) -> bool {
        present(&self.private_key_pem) || self.private_key_pem_path.is_some()
    }

    pub fn load(&self) -> ConfigResult<KeyMaterial> {
        let certificate = resolve_pem(&self.certificate_pem, &self.certificate_pem_path)?;
        let private_key = resolve_pem(&self.private_key_pem, &self.private_key_pem_path)?;
        Ok(KeyMaterial::from_pem_strings(
            certificate.as_deref(),
            private_key.as_deref(),
        )?)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub region: String,
    /// Without a role, the source credentials sign requests directly.
    pub role_arn: Option<String>,
    pub role_session_name: String,
    /// Defaults to the regional STS endpoint.
    pub sts_endpoint: Option<String>,
    pub duration_secs: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            region: "us-gov-west-1".to_string(),
            role_arn: None,
            role_session_name: "trdm-sync".to_string(),
            sts_endpoint: None,
            duration_secs: trdm_gateway::sts::DEFAULT_DURATION_SECS,
        }
    }
}

impl GatewayConfig {
    pub fn assume_role(&self) -> Option<AssumeRoleConfig> {
        let role_arn = self.role_arn.clone().filter(|arn| !arn.trim().is_empty())?;
        Some(AssumeRoleConfig {
            role_arn,
            role_session_name: self.role_session_name.clone(),
            sts_endpoint: self
                .sts_endpoint
                .clone()
                .unwrap_or_else(|| format!("https://sts.{}.amazonaws.com/", self.region)),
            region: self.region.clone(),
            duration_secs: self.duration_secs,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub auth: AuthMethod,
    pub tables: Vec<TableIdentifier>,
    pub interval_secs: u64,
    pub store_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auth: AuthMethod::default(),
            tables: TableIdentifier::ALL.to_vec(),
            interval_secs: 24 * 60 * 60,
            store_dir: PathBuf::from("trdm-data"),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl TrdmConfig {
    /// Read `path` and apply environment overrides. Does not validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Inline PEM from the environment replaces anything in the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(pem) = lookup(ENV_CERTIFICATE_PEM).filter(|v| !v.trim().is_empty()) {
            self.credentials.certificate_pem = Some(pem);
        }
        if let Some(pem) = lookup(ENV_PRIVATE_KEY_PEM).filter(|v| !v.trim().is_empty()) {
            self.credentials.private_key_pem = Some(pem);
        }
    }

    /// Static checks for the selected auth method. Key files are not read.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sync.tables.is_empty() {
            return invalid("sync.tables must name at least one table");
        }
        if self.sync.interval_secs == 0 {
            return invalid("sync.interval_secs must be positive");
        }
        if self.soap.request_timeout_secs == 0 {
            return invalid("soap.request_timeout_secs must be positive");
        }
        match self.sync.auth {
            AuthMethod::WsSecurity => {
                if self.soap.url.trim().is_empty() {
                    return invalid("soap.url is required for ws-security");
                }
                if self.soap.timestamp_validity_secs == 0 {
                    return invalid("soap.timestamp_validity_secs must be positive");
                }
                if !self.credentials.has_certificate() {
                    return Err(CryptoError::MissingMaterial("certificate").into());
                }
                if !self.credentials.has_private_key() {
                    return Err(CryptoError::MissingMaterial("private key").into());
                }
            }
            AuthMethod::Gateway => {
                if self.gateway.base_url.trim().is_empty() {
                    return invalid("gateway.base_url is required for gateway auth");
                }
                if self.gateway.region.trim().is_empty() {
                    return invalid("gateway.region is required for gateway auth");
                }
                if self.gateway.role_arn.is_some() && self.gateway.duration_secs < 900 {
                    return invalid("gateway.duration_secs must be at least 900");
                }
            }
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigResult<()> {
    Err(ConfigError::Invalid(message.to_string()))
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn resolve_pem(inline: &Option<String>, path: &Option<PathBuf>) -> ConfigResult<Option<String>> {
    if present(inline) {
        return Ok(inline.clone());
    }
    match path {
        Some(path) => std::fs::read_to_string(path)
            .map(Some)
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            }),
        None => Ok(None),
    }
}

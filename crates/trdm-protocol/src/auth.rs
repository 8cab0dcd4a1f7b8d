use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How requests to TRDM are authenticated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    /// SOAP with a WS-Security X.509 signature.
    #[default]
    WsSecurity,
    /// JSON through the REST gateway, SigV4-signed with assumed-role credentials.
    Gateway,
}

impl AuthMethod {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::WsSecurity => "ws-security",
            Self::Gateway => "gateway",
        }
    }

    /// Whether this method needs an X.509 certificate and private key.
    pub fn requires_key_material(&self) -> bool {
        matches!(self, Self::WsSecurity)
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ws-security" | "wssecurity" | "soap" => Ok(Self::WsSecurity),
            "gateway" | "sigv4" => Ok(Self::Gateway),
            other => Err(format!("unknown auth method: {other}")),
        }
    }
}

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use trdm_crypto::CryptoError;
use trdm_gateway::GatewayError;
use trdm_protocol::ProtocolError;
use trdm_store::StoreError;
use trdm_wsse::WsseError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("envelope error: {0}")]
    Envelope(#[from] WsseError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Coarse failure category used for reporting and exit codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid configuration or key material. Nothing was sent.
    Configuration,
    Transport,
    /// The response could not be understood.
    Parse,
    /// Envelope digesting, signing, or credential failure. Nothing was sent.
    Signing,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::Parse => "parse",
            Self::Signing => "signing",
            Self::Storage => "storage",
        })
    }
}

fn crypto_kind(err: &CryptoError) -> ErrorKind {
    match err {
        CryptoError::Signing(_) | CryptoError::InvalidSignature => ErrorKind::Signing,
        _ => ErrorKind::Configuration,
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Crypto(e) => crypto_kind(e),
            Self::Envelope(WsseError::Crypto(e)) => crypto_kind(e),
            Self::Envelope(WsseError::InvalidValidity | WsseError::TimestampOutOfRange) => {
                ErrorKind::Configuration
            }
            Self::Envelope(_) => ErrorKind::Signing,
            Self::Protocol(_) => ErrorKind::Parse,
            Self::Gateway(e) => match e {
                GatewayError::MissingCredentials(_) | GatewayError::InvalidRequest(_) => {
                    ErrorKind::Configuration
                }
                GatewayError::Sts { .. } | GatewayError::Http(_) => ErrorKind::Transport,
                GatewayError::StsResponse(_) | GatewayError::Xml(_) => ErrorKind::Parse,
                GatewayError::CredentialsExpired { .. } | GatewayError::Signing(_) => {
                    ErrorKind::Signing
                }
            },
            Self::Store(_) => ErrorKind::Storage,
            Self::Transport(_) | Self::HttpStatus { .. } | Self::Timeout { .. } => {
                ErrorKind::Transport
            }
        }
    }
}

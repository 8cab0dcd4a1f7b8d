use thiserror::Error;
use trdm_wsse::WsseError;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Source credentials were not configured.
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("credentials for {access_key_id} expired at {expired_at}")]
    CredentialsExpired {
        access_key_id: String,
        expired_at: String,
    },

    /// STS answered with a non-success HTTP status.
    #[error("STS request failed with HTTP {status}: {body}")]
    Sts { status: u16, body: String },

    #[error("malformed STS response: {0}")]
    StsResponse(String),

    #[error("STS response XML: {0}")]
    Xml(#[from] WsseError),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

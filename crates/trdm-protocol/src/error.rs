use thiserror::Error;
use trdm_wsse::WsseError;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Response body was not well-formed XML.
    #[error("malformed response XML: {0}")]
    Xml(#[from] WsseError),

    #[error("missing field in response: {0}")]
    MissingField(&'static str),

    #[error("invalid {field} value {value:?}: {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// The service answered with a SOAP Fault.
    #[error("SOAP fault: {reason}")]
    Fault { code: Option<String>, reason: String },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("MIME error: {0}")]
    Mime(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

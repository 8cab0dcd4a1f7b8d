//! Wire protocol for the TRDM ReturnTable service.
//!
//! Defines the SOAP operation payloads, response decoding (including the
//! `multipart/related` attachment of "get table"), and the JSON bodies used
//! when the service is reached through the signed API gateway.

pub mod auth;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod mime;

pub use auth::AuthMethod;
pub use codec::{SoapCodec, SoapResponse};
pub use endpoint::{endpoints, join_url, DEFAULT_SOAP_ACTION, JSON_CONTENT_TYPE, SOAP_CONTENT_TYPE};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    from_json, to_json, GetTableRequest, GetTableResponse, LastTableUpdateRequest,
    LastTableUpdateResponse, SoapOperation, RET_NS, RET_PREFIX,
};

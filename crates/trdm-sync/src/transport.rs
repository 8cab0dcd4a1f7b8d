use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use trdm_protocol::SOAP_CONTENT_TYPE;

use crate::error::{SyncError, SyncResult};

/// A sealed SOAP request ready to go on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoapRequest {
    pub action: String,
    pub body: Vec<u8>,
}

/// An unparsed HTTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into a transport error.
    pub fn error_for_status(self) -> SyncResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SyncError::HttpStatus {
                status: self.status,
                body: excerpt(&self.body),
            })
        }
    }
}

/// Delivers SOAP envelopes to the TRDM endpoint.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    async fn send(&self, request: SoapRequest) -> SyncResult<RawResponse>;
}

/// Delivers already-signed gateway requests.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn execute(&self, request: http::Request<Vec<u8>>) -> SyncResult<RawResponse>;
}

/// HTTPS transport on a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    soap_url: Option<String>,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            soap_url: None,
        })
    }

    /// Endpoint used by [`SoapTransport::send`].
    pub fn with_soap_url(mut self, url: impl Into<String>) -> Self {
        self.soap_url = Some(url.into());
        self
    }

    async fn read(response: reqwest::Response) -> SyncResult<RawResponse> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?
            .to_vec();
        debug!(status, content_type = ?content_type, len = body.len(), "received response");
        RawResponse {
            status,
            content_type,
            body,
        }
        .error_for_status()
    }
}

#[async_trait]
impl SoapTransport for HttpTransport {
    async fn send(&self, request: SoapRequest) -> SyncResult<RawResponse> {
        let url = self
            .soap_url
            .as_deref()
            .ok_or_else(|| SyncError::Config("SOAP endpoint URL is not configured".into()))?;
        debug!(url, action = %request.action, len = request.body.len(), "sending SOAP request");
        let response = self
            .client
            .post(url)
            .header(
                reqwest::header::CONTENT_TYPE,
                soap_content_type(&request.action),
            )
            .header("SOAPAction", format!("\"{}\"", request.action))
            .body(request.body)
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Self::read(response).await
    }
}

#[async_trait]
impl GatewayTransport for HttpTransport {
    async fn execute(&self, request: http::Request<Vec<u8>>) -> SyncResult<RawResponse> {
        let request =
            reqwest::Request::try_from(request).map_err(|e| SyncError::Transport(e.to_string()))?;
        debug!(url = %request.url(), method = %request.method(), "sending gateway request");
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Self::read(response).await
    }
}

/// SOAP 1.2 carries the action as a content-type parameter.
pub fn soap_content_type(action: &str) -> String {
    format!("{SOAP_CONTENT_TYPE}; action=\"{action}\"")
}

/// First bytes of a response body, lossily decoded, for error messages.
pub fn excerpt(body: &[u8]) -> String {
    const MAX: usize = 512;
    let text = String::from_utf8_lossy(&body[..body.len().min(MAX)]).into_owned();
    if body.len() > MAX {
        format!("{text}...")
    } else {
        text
    }
}

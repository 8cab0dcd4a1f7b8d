use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use http::Method;
use tracing::debug;
use trdm_crypto::KeyMaterial;
use trdm_gateway::{CredentialProvider, SigV4Signer};
use trdm_protocol::{
    endpoints, from_json, join_url, to_json, GetTableRequest, GetTableResponse,
    LastTableUpdateRequest, LastTableUpdateResponse, SoapCodec, SoapOperation,
    DEFAULT_SOAP_ACTION, JSON_CONTENT_TYPE, RET_NS, RET_PREFIX,
};
use trdm_types::{LastUpdateResult, TableDump, TableIdentifier, Watermark};
use trdm_wsse::{EnvelopeBuilder, DEFAULT_VALIDITY};

use crate::error::SyncResult;
use crate::transport::{GatewayTransport, SoapRequest, SoapTransport};

/// The two TRDM calls, authenticated one way or another.
#[async_trait]
pub trait TableService: Send + Sync {
    async fn last_table_update(&self, table: TableIdentifier) -> SyncResult<LastUpdateResult>;

    async fn get_table(&self, table: TableIdentifier, since: Watermark) -> SyncResult<TableDump>;
}

/// SOAP client that signs every request with WS-Security.
///
/// Each call builds, digests, and signs a fresh envelope, then sends it.
pub struct WsSecurityClient {
    material: Arc<KeyMaterial>,
    transport: Arc<dyn SoapTransport>,
    validity: Duration,
    action: String,
    verify_before_send: bool,
}

impl WsSecurityClient {
    pub fn new(material: Arc<KeyMaterial>, transport: Arc<dyn SoapTransport>) -> Self {
        Self {
            material,
            transport,
            validity: DEFAULT_VALIDITY,
            action: DEFAULT_SOAP_ACTION.to_string(),
            verify_before_send: true,
        }
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Re-check the signature of every envelope before sending it.
    pub fn with_verify_before_send(mut self, verify: bool) -> Self {
        self.verify_before_send = verify;
        self
    }

    /// Build and sign the envelope for `op`.
    pub fn seal(&self, op: &SoapOperation) -> SyncResult<SoapRequest> {
        let envelope = EnvelopeBuilder::new(&self.material)
            .validity(self.validity)
            .namespace(RET_PREFIX, RET_NS)
            .build(SoapCodec::encode_request(op))?
            .digest()?
            .sign(self.material.signing_key())?;
        if self.verify_before_send {
            envelope.verify(self.material.certificate())?;
        }
        debug!(
            operation = op.type_name(),
            table = %op.table(),
            body_id = %envelope.ids().body,
            "sealed envelope"
        );
        Ok(SoapRequest {
            action: self.action.clone(),
            body: envelope.into_bytes(),
        })
    }
}

#[async_trait]
impl TableService for WsSecurityClient {
    async fn last_table_update(&self, table: TableIdentifier) -> SyncResult<LastUpdateResult> {
        let request = self.seal(&SoapOperation::GetLastTableUpdate { table })?;
        let raw = self.transport.send(request).await?;
        let response = SoapCodec::split_response(&raw.body, raw.content_type.as_deref())?;
        Ok(SoapCodec::decode_last_update(table, &response)?)
    }

    async fn get_table(&self, table: TableIdentifier, since: Watermark) -> SyncResult<TableDump> {
        let request = self.seal(&SoapOperation::GetTable {
            table,
            content_updated_since: since,
        })?;
        let raw = self.transport.send(request).await?;
        let response = SoapCodec::split_response(&raw.body, raw.content_type.as_deref())?;
        Ok(SoapCodec::decode_get_table(table, since, response)?)
    }
}

/// JSON client for the REST gateway, SigV4-signed per request.
pub struct GatewayClient {
    base_url: String,
    signer: SigV4Signer,
    credentials: Arc<dyn CredentialProvider>,
    transport: Arc<dyn GatewayTransport>,
}

impl GatewayClient {
    pub fn new(
        base_url: impl Into<String>,
        signer: SigV4Signer,
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn GatewayTransport>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            signer,
            credentials,
            transport,
        }
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> SyncResult<Vec<u8>> {
        let credentials = self.credentials.credentials().await?;
        let request = self
            .signer
            .prepare(
                Method::POST,
                join_url(&self.base_url, path),
                body,
                credentials,
                Utc::now(),
            )
            .with_content_type(JSON_CONTENT_TYPE)
            .into_signed(&self.signer)?;
        debug!(path, "sending signed gateway request");
        Ok(self.transport.execute(request).await?.body)
    }
}

#[async_trait]
impl TableService for GatewayClient {
    async fn last_table_update(&self, table: TableIdentifier) -> SyncResult<LastUpdateResult> {
        let body = to_json(&LastTableUpdateRequest {
            physical_name: table,
        })?;
        let raw = self.post(endpoints::LAST_TABLE_UPDATE, body).await?;
        let response: LastTableUpdateResponse = from_json(&raw)?;
        Ok(response.into_result(table)?)
    }

    async fn get_table(&self, table: TableIdentifier, since: Watermark) -> SyncResult<TableDump> {
        let body = to_json(&GetTableRequest {
            physical_name: table,
            content_updated_since_date_time: since,
            return_content: true,
        })?;
        let raw = self.post(endpoints::GET_TABLE, body).await?;
        let response: GetTableResponse = from_json(&raw)?;
        Ok(response.into_dump(table, since)?)
    }
}

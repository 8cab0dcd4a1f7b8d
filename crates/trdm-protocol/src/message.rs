use serde::{Deserialize, Serialize};
use trdm_types::{LastUpdateResult, StatusCode, TableDump, TableIdentifier, Watermark};
use trdm_wsse::Element;

use crate::error::{ProtocolError, ProtocolResult};

/// Namespace of the TRDM ReturnTable service.
pub const RET_NS: &str = "http://trdm/ReturnTableService";
pub const RET_PREFIX: &str = "ret";

/// The two operations the ReturnTable service exposes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SoapOperation {
    GetLastTableUpdate {
        table: TableIdentifier,
    },
    GetTable {
        table: TableIdentifier,
        content_updated_since: Watermark,
    },
}

impl SoapOperation {
    pub fn table(&self) -> TableIdentifier {
        match self {
            Self::GetLastTableUpdate { table } | Self::GetTable { table, .. } => *table,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::GetLastTableUpdate { .. } => "getLastTableUpdate",
            Self::GetTable { .. } => "getTable",
        }
    }

    /// The `soap:Body` child for this operation, in the `ret` namespace.
    ///
    /// The `ret` prefix is declared on the envelope, not here.
    pub fn to_payload(&self) -> Element {
        match self {
            Self::GetLastTableUpdate { table } => Element::new("ret:getLastTableUpdateRequestElement")
                .with_child(Element::new("ret:physicalName").with_text(table.physical_name())),
            Self::GetTable {
                table,
                content_updated_since,
            } => Element::new("ret:getTableRequestElement").with_child(
                Element::new("ret:input").with_child(
                    Element::new("ret:TRDM")
                        .with_child(Element::new("ret:physicalName").with_text(table.physical_name()))
                        .with_child(Element::new("ret:returnContent").with_text("true"))
                        .with_child(
                            Element::new("ret:contentUpdatedSinceDateTime")
                                .with_text(content_updated_since.to_wire()),
                        ),
                ),
            ),
        }
    }
}

/// Gateway body for `/lastTableUpdate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastTableUpdateRequest {
    pub physical_name: TableIdentifier,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastTableUpdateResponse {
    #[serde(default)]
    pub last_update: Option<Watermark>,
    pub status_code: StatusCode,
    #[serde(default)]
    pub date_time: Option<Watermark>,
}

impl LastTableUpdateResponse {
    /// A successful status without `lastUpdate` is malformed.
    pub fn into_result(self, table: TableIdentifier) -> ProtocolResult<LastUpdateResult> {
        if self.status_code.is_successful() && self.last_update.is_none() {
            return Err(ProtocolError::MissingField("lastUpdate"));
        }
        Ok(LastUpdateResult {
            table,
            last_update: self.last_update,
            status_code: self.status_code,
            status_date_time: self.date_time,
        })
    }
}

/// Gateway body for `/getTable`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTableRequest {
    pub physical_name: TableIdentifier,
    pub content_updated_since_date_time: Watermark,
    pub return_content: bool,
}

/// Gateway answer to `/getTable`. The attachment travels base64-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTableResponse {
    pub status_code: StatusCode,
    #[serde(default)]
    pub date_time: Option<Watermark>,
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl GetTableResponse {
    pub fn into_dump(self, table: TableIdentifier, since: Watermark) -> ProtocolResult<TableDump> {
        let attachment = self
            .attachment
            .map(|b64| {
                trdm_crypto::decode_base64(&b64).map_err(|e| ProtocolError::InvalidValue {
                    field: "attachment",
                    value: format!("{} base64 chars", b64.len()),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        Ok(TableDump {
            table,
            status_code: self.status_code,
            status_date_time: self.date_time,
            content_updated_since: since,
            attachment,
            content_type: self.content_type,
        })
    }
}

/// Serialize a gateway DTO.
pub fn to_json<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Deserialize a gateway DTO.
pub fn from_json<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> ProtocolResult<T> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::Deserialization(e.to_string()))
}

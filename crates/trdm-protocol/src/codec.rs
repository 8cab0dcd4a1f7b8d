use trdm_types::{LastUpdateResult, StatusCode, TableDump, TableIdentifier, Watermark};
use trdm_wsse::{xml, Element};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::SoapOperation;
use crate::mime;

/// A SOAP response split into its envelope and optional attachment.
#[derive(Clone, Debug)]
pub struct SoapResponse {
    pub envelope: Element,
    pub attachment: Option<Vec<u8>>,
    pub attachment_content_type: Option<String>,
}

/// Encodes request payloads and decodes ReturnTable responses.
///
/// Response elements are matched by local name so the service's choice of
/// prefixes (or a default namespace) does not matter.
pub struct SoapCodec;

impl SoapCodec {
    pub fn encode_request(op: &SoapOperation) -> Element {
        op.to_payload()
    }

    /// Split a raw HTTP body into envelope and attachment.
    ///
    /// Multipart bodies are recognized by content type or, failing that, by a
    /// leading boundary line. The envelope is the first XML part and the
    /// attachment is the first non-XML part.
    pub fn split_response(body: &[u8], content_type: Option<&str>) -> ProtocolResult<SoapResponse> {
        let boundary = match content_type {
            Some(ct) if mime::is_multipart(ct) => Some(
                mime::boundary(ct)
                    .ok_or_else(|| ProtocolError::Mime("multipart without boundary".into()))?,
            ),
            _ => mime::sniff_boundary(body),
        };

        let Some(boundary) = boundary else {
            return Ok(SoapResponse {
                envelope: parse_envelope(body)?,
                attachment: None,
                attachment_content_type: None,
            });
        };

        let parts = mime::split(body, &boundary)?;
        let envelope_idx = parts.iter().position(mime::MimePart::is_xml).unwrap_or(0);
        let envelope = parse_envelope(&parts[envelope_idx].body)?;
        let attachment = parts
            .iter()
            .enumerate()
            .find(|(idx, part)| *idx != envelope_idx && !part.is_xml())
            .map(|(_, part)| part);
        tracing::debug!(
            parts = parts.len(),
            attachment_len = attachment.map_or(0, |p| p.body.len()),
            "split multipart response"
        );
        Ok(SoapResponse {
            envelope,
            attachment: attachment.map(|p| p.body.clone()),
            attachment_content_type: attachment.and_then(|p| p.content_type().map(str::to_string)),
        })
    }

    /// Decode `getLastTableUpdateResponseElement`.
    pub fn decode_last_update(
        table: TableIdentifier,
        response: &SoapResponse,
    ) -> ProtocolResult<LastUpdateResult> {
        check_fault(&response.envelope)?;
        let element = response
            .envelope
            .find_local("getLastTableUpdateResponseElement")
            .ok_or(ProtocolError::MissingField("getLastTableUpdateResponseElement"))?;
        let (status_code, status_date_time) = decode_status(element)?;
        let last_update = optional_watermark(element.child("lastUpdate"), "lastUpdate")?;
        if status_code.is_successful() && last_update.is_none() {
            return Err(ProtocolError::MissingField("lastUpdate"));
        }
        Ok(LastUpdateResult {
            table,
            last_update,
            status_code,
            status_date_time,
        })
    }

    /// Decode `getTableResponseElement` plus the attachment.
    pub fn decode_get_table(
        table: TableIdentifier,
        since: Watermark,
        response: SoapResponse,
    ) -> ProtocolResult<TableDump> {
        check_fault(&response.envelope)?;
        let element = response
            .envelope
            .find_local("getTableResponseElement")
            .ok_or(ProtocolError::MissingField("getTableResponseElement"))?;
        let (status_code, status_date_time) = decode_status(element)?;
        if let Some(name) = element
            .descend(&["output", "TRDM", "physicalName"])
            .map(|e| e.text())
        {
            if name.trim() != table.physical_name() {
                return Err(ProtocolError::UnexpectedResponse(format!(
                    "requested {table}, response is for {}",
                    name.trim()
                )));
            }
        }
        Ok(TableDump {
            table,
            status_code,
            status_date_time,
            content_updated_since: since,
            attachment: response.attachment,
            content_type: response.attachment_content_type,
        })
    }
}

fn parse_envelope(bytes: &[u8]) -> ProtocolResult<Element> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ProtocolError::UnexpectedResponse(format!("response is not UTF-8: {e}")))?;
    let root = xml::parse(text)?;
    if root.name().local() != "Envelope" {
        return Err(ProtocolError::UnexpectedResponse(format!(
            "expected a SOAP Envelope, found <{}>",
            root.name()
        )));
    }
    Ok(root)
}

/// Map a `soap:Fault` (1.2 `Reason/Text` or 1.1 `faultstring`) to an error.
fn check_fault(envelope: &Element) -> ProtocolResult<()> {
    let Some(fault) = envelope.child("Body").and_then(|b| b.child("Fault")) else {
        return Ok(());
    };
    let code = fault
        .descend(&["Code", "Value"])
        .or_else(|| fault.child("faultcode"))
        .map(|e| e.text().trim().to_string());
    let reason = fault
        .descend(&["Reason", "Text"])
        .or_else(|| fault.child("faultstring"))
        .map(|e| e.text().trim().to_string())
        .unwrap_or_else(|| "unspecified".to_string());
    Err(ProtocolError::Fault { code, reason })
}

fn decode_status(element: &Element) -> ProtocolResult<(StatusCode, Option<Watermark>)> {
    let status = element
        .child("status")
        .ok_or(ProtocolError::MissingField("status"))?;
    let code = status
        .child("statusCode")
        .map(|e| e.text())
        .filter(|t| !t.trim().is_empty())
        .ok_or(ProtocolError::MissingField("status/statusCode"))?;
    let date_time = optional_watermark(status.child("dateTime"), "status/dateTime")?;
    Ok((StatusCode::parse(&code), date_time))
}

fn optional_watermark(
    element: Option<&Element>,
    field: &'static str,
) -> ProtocolResult<Option<Watermark>> {
    let Some(text) = element.map(|e| e.text()) else {
        return Ok(None);
    };
    if text.trim().is_empty() {
        return Ok(None);
    }
    Watermark::parse(&text)
        .map(Some)
        .map_err(|e| ProtocolError::InvalidValue {
            field,
            value: text.trim().to_string(),
            reason: e.to_string(),
        })
}

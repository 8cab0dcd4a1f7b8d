//! Just enough `multipart/related` handling to pull the SOAP envelope and
//! the table attachment out of a "get table" response.

use crate::error::{ProtocolError, ProtocolResult};

/// One body part: its headers and raw content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MimePart {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MimePart {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// `text/xml`, `application/soap+xml`, `application/xop+xml`, ...
    pub fn is_xml(&self) -> bool {
        self.content_type()
            .map(|ct| media_type(ct).contains("xml"))
            .unwrap_or(false)
    }
}

/// `true` for any `multipart/*` media type.
pub fn is_multipart(content_type: &str) -> bool {
    media_type(content_type).starts_with("multipart/")
}

/// The lowercased media type without parameters.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// The `boundary` parameter of a multipart content type, unquoted.
pub fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Guess the boundary from a body whose first line is `--boundary`.
pub fn sniff_boundary(body: &[u8]) -> Option<String> {
    let rest = body.strip_prefix(b"--")?;
    let line_end = rest.iter().position(|&b| b == b'\n')?;
    let line = std::str::from_utf8(&rest[..line_end]).ok()?.trim_end_matches('\r');
    (!line.is_empty() && !line.contains(char::is_whitespace)).then(|| line.to_string())
}

/// Split a multipart body into its parts. Preamble and epilogue are dropped.
pub fn split(body: &[u8], boundary: &str) -> ProtocolResult<Vec<MimePart>> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut positions = Vec::new();
    let mut from = 0;
    while let Some(pos) = find(&body[from..], &delimiter) {
        positions.push(from + pos);
        from += pos + delimiter.len();
    }
    if positions.is_empty() {
        return Err(ProtocolError::Mime(format!("boundary {boundary:?} not found")));
    }

    let mut parts = Vec::new();
    for window in positions.windows(2) {
        let after = window[0] + delimiter.len();
        if body[after..].starts_with(b"--") {
            break;
        }
        let start = match body[after..].iter().position(|&b| b == b'\n') {
            Some(nl) => after + nl + 1,
            None => break,
        };
        let mut end = window[1];
        if end >= start + 2 && &body[end - 2..end] == b"\r\n" {
            end -= 2;
        } else if end > start && body[end - 1] == b'\n' {
            end -= 1;
        }
        if start <= end {
            parts.push(parse_part(&body[start..end])?);
        }
    }
    if parts.is_empty() {
        return Err(ProtocolError::Mime("multipart body has no parts".into()));
    }
    Ok(parts)
}

fn parse_part(raw: &[u8]) -> ProtocolResult<MimePart> {
    let (head, body) = if let Some(rest) = raw.strip_prefix(b"\r\n") {
        (&raw[..0], rest)
    } else if let Some(rest) = raw.strip_prefix(b"\n") {
        (&raw[..0], rest)
    } else if let Some(pos) = find(raw, b"\r\n\r\n") {
        (&raw[..pos], &raw[pos + 4..])
    } else if let Some(pos) = find(raw, b"\n\n") {
        (&raw[..pos], &raw[pos + 2..])
    } else {
        return Err(ProtocolError::Mime("part has no header terminator".into()));
    };

    let head = std::str::from_utf8(head)
        .map_err(|e| ProtocolError::Mime(format!("non-UTF-8 part headers: {e}")))?;
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in head.lines() {
        if line.starts_with(|c: char| c == ' ' || c == '\t') {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    Ok(MimePart {
        headers,
        body: body.to_vec(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

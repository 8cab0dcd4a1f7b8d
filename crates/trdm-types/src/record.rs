use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::status::StatusCode;
use crate::table::TableIdentifier;
use crate::watermark::Watermark;

/// A locally persisted row of a reference table.
///
/// `updated_at` is the local watermark. Row contents are opaque to the sync
/// core and kept as ordered column/value pairs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    pub table: TableIdentifier,
    pub key: String,
    pub updated_at: Watermark,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl TableRecord {
    pub fn new(table: TableIdentifier, key: impl Into<String>, updated_at: Watermark) -> Self {
        Self {
            table,
            key: key.into(),
            updated_at,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// `true` if this record was last touched strictly before `remote`.
    pub fn is_stale_against(&self, remote: &Watermark) -> bool {
        self.updated_at.is_older_than(remote)
    }
}

/// Parsed answer to "get last table update". Consumed once, never stored.
///
/// `last_update` is always present when the status is successful; a
/// failed lookup may omit it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastUpdateResult {
    pub table: TableIdentifier,
    pub last_update: Option<Watermark>,
    pub status_code: StatusCode,
    /// Server time at which the status was produced, when reported.
    pub status_date_time: Option<Watermark>,
}

/// Parsed answer to "get table": status plus the raw table attachment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableDump {
    pub table: TableIdentifier,
    pub status_code: StatusCode,
    pub status_date_time: Option<Watermark>,
    /// The `contentUpdatedSinceDateTime` the dump was requested with.
    pub content_updated_since: Watermark,
    /// Raw attachment bytes (delimited text); `None` if the service sent none.
    pub attachment: Option<Vec<u8>>,
    pub content_type: Option<String>,
}

impl TableDump {
    pub fn attachment_len(&self) -> usize {
        self.attachment.as_ref().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wm(s: &str) -> Watermark {
        Watermark::parse(s).unwrap()
    }

    #[test]
    fn record_staleness_is_strict() {
        let remote = wm("2020-01-27T16:14:20.000Z");
        let older = TableRecord::new(TableIdentifier::TransportationAccountingCode, "A1", wm("2020-01-01T00:00:00.000Z"));
        let equal = TableRecord::new(TableIdentifier::TransportationAccountingCode, "A2", remote);
        let newer = TableRecord::new(TableIdentifier::TransportationAccountingCode, "A3", wm("2021-01-01T00:00:00.000Z"));
        assert!(older.is_stale_against(&remote));
        assert!(!equal.is_stale_against(&remote));
        assert!(!newer.is_stale_against(&remote));
    }

    #[test]
    fn record_fields_builder() {
        let r = TableRecord::new(TableIdentifier::LineOfAccounting, "L1", wm("2020-01-01T00:00:00Z"))
            .with_field("LOA_SYS_ID", "10001")
            .with_field("LOA_DPT_ID", "97");
        assert_eq!(r.fields.len(), 2);
        assert_eq!(r.fields["LOA_SYS_ID"], "10001");
    }

    #[test]
    fn record_serde_roundtrip() {
        let r = TableRecord::new(TableIdentifier::LineOfAccounting, "L1", wm("2020-01-01T00:00:00Z"))
            .with_field("k", "v");
        let json = serde_json::to_string(&r).unwrap();
        let parsed: TableRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, r);
    }

    #[test]
    fn dump_attachment_len() {
        let mut dump = TableDump {
            table: TableIdentifier::LineOfAccounting,
            status_code: StatusCode::Successful,
            status_date_time: None,
            content_updated_since: wm("2020-01-01T00:00:00Z"),
            attachment: None,
            content_type: None,
        };
        assert_eq!(dump.attachment_len(), 0);
        dump.attachment = Some(b"a|b|c\n".to_vec());
        assert_eq!(dump.attachment_len(), 6);
    }
}

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A "last modified" instant used to decide whether local data is stale.
///
/// Always normalized to UTC. Rendered on the wire as ISO 8601 with
/// millisecond precision and a `Z` suffix, e.g. `2020-01-27T16:14:20.000Z`.
///
/// Ordering is plain chronological order; "older than" is strict.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse an RFC 3339 / ISO 8601 timestamp with any offset.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let trimmed = s.trim();
        DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| TypeError::InvalidTimestamp {
                value: trimmed.to_string(),
                reason: e.to_string(),
            })
    }

    /// Build from milliseconds since the UNIX epoch.
    pub fn from_unix_millis(ms: i64) -> Result<Self, TypeError> {
        Utc.timestamp_millis_opt(ms)
            .single()
            .map(Self)
            .ok_or_else(|| TypeError::InvalidTimestamp {
                value: ms.to_string(),
                reason: "out of range".into(),
            })
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// `true` if this watermark is strictly before `other`.
    ///
    /// Equal watermarks are not older: a record stamped exactly at the
    /// remote watermark is already current.
    pub fn is_older_than(&self, other: &Self) -> bool {
        self.0 < other.0
    }

    /// Wire format with millisecond precision.
    pub fn to_wire(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl From<DateTime<Utc>> for Watermark {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl TryFrom<String> for Watermark {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Watermark> for String {
    fn from(w: Watermark) -> Self {
        w.to_wire()
    }
}

impl fmt::Debug for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Watermark({})", self.to_wire())
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

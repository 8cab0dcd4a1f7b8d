use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A TRDM reference table that this client knows how to synchronize.
///
/// Serialized as the physical table name used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TableIdentifier {
    /// Lines of Accounting (LOA).
    #[serde(rename = "LN_OF_ACCT")]
    LineOfAccounting,
    /// Transportation Accounting Codes (TAC).
    #[serde(rename = "TRNSPRTN_ACNT")]
    TransportationAccountingCode,
}

impl TableIdentifier {
    /// Every table, in a stable order.
    pub const ALL: [TableIdentifier; 2] = [
        TableIdentifier::LineOfAccounting,
        TableIdentifier::TransportationAccountingCode,
    ];

    /// The physical table name sent to TRDM.
    pub const fn physical_name(&self) -> &'static str {
        match self {
            Self::LineOfAccounting => "LN_OF_ACCT",
            Self::TransportationAccountingCode => "TRNSPRTN_ACNT",
        }
    }

    /// Short code used in logs and file names.
    pub const fn short_code(&self) -> &'static str {
        match self {
            Self::LineOfAccounting => "loa",
            Self::TransportationAccountingCode => "tac",
        }
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.physical_name())
    }
}

impl FromStr for TableIdentifier {
    type Err = TypeError;

    /// Accepts the physical name or the short code, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "LN_OF_ACCT" | "LOA" => Ok(Self::LineOfAccounting),
            "TRNSPRTN_ACNT" | "TAC" => Ok(Self::TransportationAccountingCode),
            _ => Err(TypeError::UnknownTable(s.to_string())),
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status code reported by TRDM in every response's `status` block.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatusCode {
    Successful,
    Failure,
    /// Anything else the service sends back, kept verbatim.
    Other(String),
}

impl StatusCode {
    pub const SUCCESSFUL: &'static str = "Successful";
    pub const FAILURE: &'static str = "Failure";

    /// Parse the wire representation. Matching is exact after trimming.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            Self::SUCCESSFUL => Self::Successful,
            Self::FAILURE => Self::Failure,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Successful)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Successful => Self::SUCCESSFUL,
            Self::Failure => Self::FAILURE,
            Self::Other(s) => s,
        }
    }
}

impl From<String> for StatusCode {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<StatusCode> for String {
    fn from(code: StatusCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

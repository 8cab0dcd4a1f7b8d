//! Foundation types for TRDM reference-table synchronization.
//!
//! Every other `trdm-*` crate depends on `trdm-types`.
//!
//! # Key Types
//!
//! - [`TableIdentifier`]: which reference table is being synchronized
//! - [`StatusCode`]: remote status reported by the TRDM service
//! - [`Watermark`]: millisecond-precision UTC "last modified" instant
//! - [`LastUpdateResult`]: parsed answer to "get last table update"
//! - [`TableDump`]: parsed answer to "get table", including the attachment
//! - [`TableRecord`]: a locally persisted reference-table row

pub mod error;
pub mod record;
pub mod status;
pub mod table;
pub mod watermark;

pub use error::TypeError;
pub use record::{LastUpdateResult, TableDump, TableRecord};
pub use status::StatusCode;
pub use table::TableIdentifier;
pub use watermark::Watermark;

//! Persistence contract for synchronized TRDM reference tables.
//!
//! The sync core only needs two questions answered: which rows of a table
//! are older than a given watermark, and how to upsert rows. Both are
//! expressed by the [`RecordStore`] trait.
//!
//! # Storage Backends
//!
//! - [`InMemoryRecordStore`]: `HashMap`-based store for tests and embedding
//! - [`JsonFileRecordStore`]: one JSON file per table, replaced atomically

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::JsonFileRecordStore;
pub use memory::InMemoryRecordStore;
pub use traits::RecordStore;

use async_trait::async_trait;
use trdm_types::{TableIdentifier, TableRecord, Watermark};

use crate::error::{StoreError, StoreResult};

/// Persistence for synchronized reference-table rows.
///
/// Implementations must be safe to share between concurrently running
/// table cycles. Rows are keyed by `(table, key)`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records of `table` whose `updated_at` is strictly before `instant`,
    /// ordered by key.
    async fn fetch_older_than(
        &self,
        table: TableIdentifier,
        instant: Watermark,
    ) -> StoreResult<Vec<TableRecord>>;

    /// Insert or replace records by key. Returns the number written.
    async fn upsert(&self, table: TableIdentifier, records: Vec<TableRecord>) -> StoreResult<usize>;

    /// Number of records held for `table`.
    async fn count(&self, table: TableIdentifier) -> StoreResult<usize>;
}

/// Every record must belong to `table`.
pub(crate) fn check_table(table: TableIdentifier, records: &[TableRecord]) -> StoreResult<()> {
    match records.iter().find(|r| r.table != table) {
        Some(r) => Err(StoreError::TableMismatch {
            key: r.key.clone(),
            expected: table,
            found: r.table,
        }),
        None => Ok(()),
    }
}

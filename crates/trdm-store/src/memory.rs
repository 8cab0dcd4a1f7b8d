use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use trdm_types::{TableIdentifier, TableRecord, Watermark};

use crate::error::StoreResult;
use crate::traits::{check_table, RecordStore};

/// In-memory record store.
///
/// Intended for tests and embedding. Records live behind a `RwLock`,
/// grouped by table and ordered by key.
pub struct InMemoryRecordStore {
    tables: RwLock<HashMap<TableIdentifier, BTreeMap<String, TableRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// A store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = TableRecord>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.write().expect("lock poisoned");
            for record in records {
                tables
                    .entry(record.table)
                    .or_default()
                    .insert(record.key.clone(), record);
            }
        }
        store
    }

    /// Total records across all tables.
    pub fn len(&self) -> usize {
        self.tables
            .read()
            .expect("lock poisoned")
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, table: TableIdentifier, key: &str) -> Option<TableRecord> {
        self.tables
            .read()
            .expect("lock poisoned")
            .get(&table)
            .and_then(|rows| rows.get(key))
            .cloned()
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch_older_than(
        &self,
        table: TableIdentifier,
        instant: Watermark,
    ) -> StoreResult<Vec<TableRecord>> {
        let tables = self.tables.read().expect("lock poisoned");
        Ok(tables
            .get(&table)
            .map(|rows| {
                rows.values()
                    .filter(|r| r.is_stale_against(&instant))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert(&self, table: TableIdentifier, records: Vec<TableRecord>) -> StoreResult<usize> {
        check_table(table, &records)?;
        let written = records.len();
        let mut tables = self.tables.write().expect("lock poisoned");
        let rows = tables.entry(table).or_default();
        for record in records {
            rows.insert(record.key.clone(), record);
        }
        Ok(written)
    }

    async fn count(&self, table: TableIdentifier) -> StoreResult<usize> {
        let tables = self.tables.read().expect("lock poisoned");
        Ok(tables.get(&table).map_or(0, BTreeMap::len))
    }
}

impl std::fmt::Debug for InMemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRecordStore")
            .field("record_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    const LOA: TableIdentifier = TableIdentifier::LineOfAccounting;
    const TAC: TableIdentifier = TableIdentifier::TransportationAccountingCode;

    fn wm(s: &str) -> Watermark {
        Watermark::parse(s).unwrap()
    }

    fn record(table: TableIdentifier, key: &str, at: &str) -> TableRecord {
        TableRecord::new(table, key, wm(at))
    }

    #[tokio::test]
    async fn fetch_older_than_is_strict() {
        let store = InMemoryRecordStore::with_records([
            record(TAC, "a", "2020-01-27T16:14:19.999Z"),
            record(TAC, "b", "2020-01-27T16:14:20.000Z"),
            record(TAC, "c", "2020-01-28T00:00:00.000Z"),
        ]);
        let stale = store
            .fetch_older_than(TAC, wm("2020-01-27T16:14:20.000Z"))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].key, "a");
    }

    #[tokio::test]
    async fn tables_are_isolated() {
        let store = InMemoryRecordStore::with_records([
            record(LOA, "a", "2019-01-01T00:00:00Z"),
            record(TAC, "a", "2021-01-01T00:00:00Z"),
        ]);
        let cutoff = wm("2020-01-01T00:00:00Z");
        assert_eq!(store.fetch_older_than(LOA, cutoff).await.unwrap().len(), 1);
        assert!(store.fetch_older_than(TAC, cutoff).await.unwrap().is_empty());
        assert_eq!(store.count(LOA).await.unwrap(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn upsert_replaces_by_key() {
        let store = InMemoryRecordStore::new();
        assert!(store.is_empty());
        let n = store
            .upsert(
                LOA,
                vec![
                    record(LOA, "k1", "2020-01-01T00:00:00Z"),
                    record(LOA, "k2", "2020-01-01T00:00:00Z"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(n, 2);
        store
            .upsert(
                LOA,
                vec![record(LOA, "k1", "2020-02-01T00:00:00Z").with_field("LOA_SYS_ID", "42")],
            )
            .await
            .unwrap();
        assert_eq!(store.count(LOA).await.unwrap(), 2);
        let k1 = store.get(LOA, "k1").unwrap();
        assert_eq!(k1.updated_at, wm("2020-02-01T00:00:00Z"));
        assert_eq!(k1.fields["LOA_SYS_ID"], "42");
    }

    #[tokio::test]
    async fn upsert_rejects_foreign_records() {
        let store = InMemoryRecordStore::new();
        let err = store
            .upsert(LOA, vec![record(TAC, "x", "2020-01-01T00:00:00Z")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TableMismatch { found: TAC, .. }));
        assert_eq!(store.count(LOA).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_table_counts_zero() {
        let store = InMemoryRecordStore::default();
        assert_eq!(store.count(TAC).await.unwrap(), 0);
        assert!(store
            .fetch_older_than(TAC, Watermark::now())
            .await
            .unwrap()
            .is_empty());
    }
}

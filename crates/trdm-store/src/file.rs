use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use trdm_types::{TableIdentifier, TableRecord, Watermark};

use crate::error::{StoreError, StoreResult};
use crate::traits::{check_table, RecordStore};

/// One JSON file per table under a directory.
///
/// Each file holds the table's records as a JSON array ordered by key.
/// Writes go to a temporary file in the same directory which is then
/// renamed over the old one, so readers never see a partial file.
#[derive(Debug)]
pub struct JsonFileRecordStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileRecordStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `table`.
    pub fn table_path(&self, table: TableIdentifier) -> PathBuf {
        self.dir.join(format!("{}.json", table.physical_name()))
    }

    async fn load(&self, table: TableIdentifier) -> StoreResult<Vec<TableRecord>> {
        let path = self.table_path(table);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            path,
            reason: e.to_string(),
        })
    }
}

fn write_atomically(dir: &Path, path: &Path, records: &[TableRecord]) -> StoreResult<()> {
    let json =
        serde_json::to_vec_pretty(records).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn fetch_older_than(
        &self,
        table: TableIdentifier,
        instant: Watermark,
    ) -> StoreResult<Vec<TableRecord>> {
        let mut stale: Vec<TableRecord> = self
            .load(table)
            .await?
            .into_iter()
            .filter(|r| r.is_stale_against(&instant))
            .collect();
        stale.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(stale)
    }

    async fn upsert(&self, table: TableIdentifier, records: Vec<TableRecord>) -> StoreResult<usize> {
        check_table(table, &records)?;
        let written = records.len();
        let _guard = self.write_lock.lock().await;

        let mut rows: std::collections::BTreeMap<String, TableRecord> = self
            .load(table)
            .await?
            .into_iter()
            .map(|r| (r.key.clone(), r))
            .collect();
        for record in records {
            rows.insert(record.key.clone(), record);
        }
        let rows: Vec<TableRecord> = rows.into_values().collect();
        let total = rows.len();

        let dir = self.dir.clone();
        let path = self.table_path(table);
        tokio::task::spawn_blocking(move || write_atomically(&dir, &path, &rows))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        debug!(table = %table, written, total, "persisted table file");
        Ok(written)
    }

    async fn count(&self, table: TableIdentifier) -> StoreResult<usize> {
        Ok(self.load(table).await?.len())
    }
}

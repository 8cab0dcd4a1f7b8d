use async_trait::async_trait;
use tracing::info;
use trdm_types::{TableDump, TableIdentifier};

use crate::context::AppContext;
use crate::error::SyncResult;

/// What applying a table dump did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileReport {
    pub table: TableIdentifier,
    pub attachment_bytes: usize,
    pub records_written: usize,
    /// `true` when the dump was received but not applied.
    pub deferred: bool,
}

/// Applies a fetched table dump to local storage.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self, ctx: &AppContext, dump: TableDump) -> SyncResult<ReconcileReport>;
}

/// Accepts the dump, records its size, and writes nothing.
///
/// How an attachment maps onto rows (full replace, merge, deletions) is
/// not settled yet, so applying it is left to a later `Reconciler`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeferredReconciler;

#[async_trait]
impl Reconciler for DeferredReconciler {
    async fn reconcile(&self, _ctx: &AppContext, dump: TableDump) -> SyncResult<ReconcileReport> {
        let attachment_bytes = dump.attachment_len();
        info!(
            table = %dump.table,
            attachment_bytes,
            content_type = ?dump.content_type,
            since = %dump.content_updated_since,
            "table dump received, reconciliation deferred"
        );
        Ok(ReconcileReport {
            table: dump.table,
            attachment_bytes,
            records_written: 0,
            deferred: true,
        })
    }
}

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info, warn, Instrument};
use trdm_types::{StatusCode, TableIdentifier, Watermark};

use crate::client::TableService;
use crate::context::AppContext;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::reconcile::{ReconcileReport, Reconciler};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// How a table's cycle ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A step failed; nothing further was attempted.
    Aborted { kind: ErrorKind, reason: String },
    /// TRDM reported a non-successful status. Not an error.
    Skipped { status: StatusCode },
    /// No local record is older than the remote watermark.
    UpToDate,
    Synchronized { report: ReconcileReport },
    /// Another cycle for the same table was still running.
    AlreadyRunning,
}

impl SyncOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Aborted { .. } => "aborted",
            Self::Skipped { .. } => "skipped",
            Self::UpToDate => "up-to-date",
            Self::Synchronized { .. } => "synchronized",
            Self::AlreadyRunning => "already-running",
        }
    }
}

/// Position in the per-table state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleState {
    CheckLastUpdate,
    /// Some local records are older than `remote`.
    FetchRequired { remote: Watermark, stale: usize },
    Done(SyncOutcome),
}

/// Summary of one table's cycle.
#[derive(Clone, Debug)]
pub struct SyncReport {
    pub table: TableIdentifier,
    pub outcome: SyncOutcome,
    pub remote_watermark: Option<Watermark>,
    pub stale_count: usize,
    pub duration: Duration,
}

/// Per-process guard so a table is never synchronized twice at once.
#[derive(Clone, Debug, Default)]
pub struct SingleFlight {
    running: Arc<Mutex<HashSet<TableIdentifier>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `table`, or `None` if it is already claimed.
    pub fn try_acquire(&self, table: TableIdentifier) -> Option<FlightGuard> {
        let mut running = self.running.lock().expect("lock poisoned");
        running.insert(table).then(|| FlightGuard {
            running: Arc::clone(&self.running),
            table,
        })
    }

    pub fn is_running(&self, table: TableIdentifier) -> bool {
        self.running.lock().expect("lock poisoned").contains(&table)
    }
}

/// Releases the table when dropped.
#[derive(Debug)]
pub struct FlightGuard {
    running: Arc<Mutex<HashSet<TableIdentifier>>>,
    table: TableIdentifier,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&self.table);
        }
    }
}

/// Drives "last update, compare, fetch, reconcile" for each table.
pub struct Orchestrator {
    service: Arc<dyn TableService>,
    reconciler: Arc<dyn Reconciler>,
    ctx: AppContext,
    call_timeout: Duration,
    flights: SingleFlight,
}

impl Orchestrator {
    pub fn new(
        service: Arc<dyn TableService>,
        reconciler: Arc<dyn Reconciler>,
        ctx: AppContext,
    ) -> Self {
        Self {
            service,
            reconciler,
            ctx,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            flights: SingleFlight::new(),
        }
    }

    /// Upper bound for each network call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Run one cycle for every table concurrently. Reports come back in
    /// the order of `tables`.
    pub async fn sync_all(&self, tables: &[TableIdentifier]) -> Vec<SyncReport> {
        join_all(tables.iter().map(|&table| self.run_cycle(table))).await
    }

    /// Run one cycle for `table`. Never fails: errors end in `Aborted`.
    pub async fn run_cycle(&self, table: TableIdentifier) -> SyncReport {
        let span = self.ctx.child(table);
        async move {
            let started = Instant::now();
            let mut report = SyncReport {
                table,
                outcome: SyncOutcome::AlreadyRunning,
                remote_watermark: None,
                stale_count: 0,
                duration: Duration::ZERO,
            };
            let Some(_guard) = self.flights.try_acquire(table) else {
                warn!("previous cycle still running, skipping");
                return report;
            };

            let mut state = CycleState::CheckLastUpdate;
            let outcome = loop {
                state = match state {
                    CycleState::CheckLastUpdate => self.check_last_update(table, &mut report).await,
                    CycleState::FetchRequired { remote, stale } => {
                        info!(stale, remote = %remote, "local data is stale, fetching table");
                        self.fetch_and_reconcile(table, remote).await
                    }
                    CycleState::Done(outcome) => break outcome,
                };
                debug!(state = ?state, "cycle transition");
            };
            report.outcome = outcome;
            report.duration = started.elapsed();

            match &report.outcome {
                SyncOutcome::Aborted { kind, reason } => {
                    warn!(kind = %kind, reason = %reason, "sync cycle aborted")
                }
                outcome => info!(
                    outcome = outcome.label(),
                    elapsed_ms = report.duration.as_millis() as u64,
                    "sync cycle finished"
                ),
            }
            report
        }
        .instrument(span)
        .await
    }

    async fn check_last_update(&self, table: TableIdentifier, report: &mut SyncReport) -> CycleState {
        let result = match self
            .bounded("getLastTableUpdate", self.service.last_table_update(table))
            .await
        {
            Ok(result) => result,
            Err(e) => return aborted(e),
        };
        if !result.status_code.is_successful() {
            info!(status = %result.status_code, "TRDM reported non-successful status");
            return CycleState::Done(SyncOutcome::Skipped {
                status: result.status_code,
            });
        }
        let Some(remote) = result.last_update else {
            return aborted(SyncError::Protocol(
                trdm_protocol::ProtocolError::MissingField("lastUpdate"),
            ));
        };
        report.remote_watermark = Some(remote);

        let stale = match self.ctx.store.fetch_older_than(table, remote).await {
            Ok(stale) => stale.len(),
            Err(e) => return aborted(e.into()),
        };
        report.stale_count = stale;
        if stale == 0 {
            CycleState::Done(SyncOutcome::UpToDate)
        } else {
            CycleState::FetchRequired { remote, stale }
        }
    }

    async fn fetch_and_reconcile(&self, table: TableIdentifier, remote: Watermark) -> CycleState {
        let dump = match self
            .bounded("getTable", self.service.get_table(table, remote))
            .await
        {
            Ok(dump) => dump,
            Err(e) => return aborted(e),
        };
        if !dump.status_code.is_successful() {
            info!(status = %dump.status_code, "TRDM refused the table dump");
            return CycleState::Done(SyncOutcome::Skipped {
                status: dump.status_code,
            });
        }
        match self.reconciler.reconcile(&self.ctx, dump).await {
            Ok(report) => CycleState::Done(SyncOutcome::Synchronized { report }),
            Err(e) => aborted(e),
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = SyncResult<T>>,
    ) -> SyncResult<T> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| SyncError::Timeout {
                operation,
                after: self.call_timeout,
            })?
    }
}

fn aborted(err: SyncError) -> CycleState {
    CycleState::Done(SyncOutcome::Aborted {
        kind: err.kind(),
        reason: err.to_string(),
    })
}

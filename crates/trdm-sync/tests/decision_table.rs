use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use trdm_store::{InMemoryRecordStore, RecordStore, StoreError};
use trdm_sync::{
    AppContext, DeferredReconciler, ErrorKind, Orchestrator, ReconcileReport, Reconciler,
    Scheduler, SyncError, SyncOutcome, SyncResult, TableService,
};
use trdm_types::{LastUpdateResult, StatusCode, TableDump, TableIdentifier, TableRecord, Watermark};

const LOA: TableIdentifier = TableIdentifier::LineOfAccounting;
const TAC: TableIdentifier = TableIdentifier::TransportationAccountingCode;
const REMOTE: &str = "2020-01-27T16:14:20.000Z";

fn wm(s: &str) -> Watermark {
    Watermark::parse(s).unwrap()
}

#[derive(Clone)]
enum LastUpdate {
    Ok(&'static str),
    Status(&'static str),
    Fail,
    Hang,
}

struct MockService {
    last_update: Mutex<Vec<(TableIdentifier, LastUpdate)>>,
    get_table_fails: bool,
    get_table_status: StatusCode,
    last_update_calls: AtomicUsize,
    get_table_calls: AtomicUsize,
    since_seen: Mutex<Vec<Watermark>>,
    delay: Duration,
}

impl MockService {
    fn new(plan: Vec<(TableIdentifier, LastUpdate)>) -> Self {
        Self {
            last_update: Mutex::new(plan),
            get_table_fails: false,
            get_table_status: StatusCode::Successful,
            last_update_calls: AtomicUsize::new(0),
            get_table_calls: AtomicUsize::new(0),
            since_seen: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    fn failing_get_table(mut self) -> Self {
        self.get_table_fails = true;
        self
    }

    fn get_table_status(mut self, status: StatusCode) -> Self {
        self.get_table_status = status;
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn plan_for(&self, table: TableIdentifier) -> LastUpdate {
        self.last_update
            .lock()
            .unwrap()
            .iter()
            .find(|(t, _)| *t == table)
            .map(|(_, p)| p.clone())
            .unwrap_or(LastUpdate::Fail)
    }

    fn get_table_calls(&self) -> usize {
        self.get_table_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TableService for MockService {
    async fn last_table_update(&self, table: TableIdentifier) -> SyncResult<LastUpdateResult> {
        self.last_update_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let (last_update, status_code) = match self.plan_for(table) {
            LastUpdate::Ok(at) => (Some(wm(at)), StatusCode::Successful),
            LastUpdate::Status(code) => (None, StatusCode::parse(code)),
            LastUpdate::Fail => return Err(SyncError::Transport("connection refused".into())),
            LastUpdate::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("the orchestrator times out first")
            }
        };
        Ok(LastUpdateResult {
            table,
            last_update,
            status_code,
            status_date_time: None,
        })
    }

    async fn get_table(&self, table: TableIdentifier, since: Watermark) -> SyncResult<TableDump> {
        self.get_table_calls.fetch_add(1, Ordering::SeqCst);
        self.since_seen.lock().unwrap().push(since);
        if self.get_table_fails {
            return Err(SyncError::HttpStatus {
                status: 500,
                body: "internal error".into(),
            });
        }
        Ok(TableDump {
            table,
            status_code: self.get_table_status.clone(),
            status_date_time: None,
            content_updated_since: since,
            attachment: Some(b"TAC|CODE\n1|GKRL\n".to_vec()),
            content_type: Some("application/octet-stream".into()),
        })
    }
}

struct FailingReconciler;

#[async_trait]
impl Reconciler for FailingReconciler {
    async fn reconcile(&self, _ctx: &AppContext, _dump: TableDump) -> SyncResult<ReconcileReport> {
        Err(StoreError::Serialization("disk full".into()).into())
    }
}

#[derive(Default)]
struct CountingReconciler {
    calls: AtomicUsize,
}

#[async_trait]
impl Reconciler for CountingReconciler {
    async fn reconcile(&self, ctx: &AppContext, dump: TableDump) -> SyncResult<ReconcileReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DeferredReconciler.reconcile(ctx, dump).await
    }
}

fn orchestrator(service: Arc<MockService>, records: Vec<TableRecord>) -> Orchestrator {
    let store = Arc::new(InMemoryRecordStore::with_records(records));
    Orchestrator::new(service, Arc::new(DeferredReconciler), AppContext::new(store))
        .with_call_timeout(Duration::from_millis(200))
}

#[tokio::test]
async fn up_to_date_when_no_record_is_older() {
    let service = Arc::new(MockService::new(vec![(TAC, LastUpdate::Ok(REMOTE))]));
    let orch = orchestrator(
        service.clone(),
        vec![
            TableRecord::new(TAC, "a", wm(REMOTE)),
            TableRecord::new(TAC, "b", wm("2020-02-01T00:00:00Z")),
        ],
    );

    let report = orch.run_cycle(TAC).await;
    assert_eq!(report.outcome, SyncOutcome::UpToDate);
    assert_eq!(report.remote_watermark, Some(wm(REMOTE)));
    assert_eq!(report.stale_count, 0);
    assert_eq!(service.get_table_calls(), 0);
}

#[tokio::test]
async fn stale_records_trigger_exactly_one_get_table() {
    let service = Arc::new(MockService::new(vec![(TAC, LastUpdate::Ok(REMOTE))]));
    let orch = orchestrator(
        service.clone(),
        vec![
            TableRecord::new(TAC, "a", wm("2020-01-27T16:14:19.999Z")),
            TableRecord::new(TAC, "b", wm("2019-06-01T00:00:00Z")),
            TableRecord::new(TAC, "c", wm("2021-01-01T00:00:00Z")),
        ],
    );

    let report = orch.run_cycle(TAC).await;
    assert_eq!(report.stale_count, 2);
    match &report.outcome {
        SyncOutcome::Synchronized { report } => {
            assert!(report.deferred);
            assert_eq!(report.attachment_bytes, 16);
        }
        other => panic!("expected Synchronized, got {other:?}"),
    }
    assert_eq!(service.get_table_calls(), 1);
    assert_eq!(*service.since_seen.lock().unwrap(), vec![wm(REMOTE)]);
}

#[tokio::test]
async fn non_successful_status_is_skipped_without_further_calls() {
    let service = Arc::new(MockService::new(vec![(LOA, LastUpdate::Status("Failure"))]));
    let orch = orchestrator(
        service.clone(),
        vec![TableRecord::new(LOA, "a", wm("2000-01-01T00:00:00Z"))],
    );

    let report = orch.run_cycle(LOA).await;
    assert_eq!(
        report.outcome,
        SyncOutcome::Skipped {
            status: StatusCode::Failure
        }
    );
    assert!(report.remote_watermark.is_none());
    assert_eq!(service.get_table_calls(), 0);
}

#[tokio::test]
async fn transport_failure_aborts_before_get_table() {
    let service = Arc::new(MockService::new(vec![(LOA, LastUpdate::Fail)]));
    let orch = orchestrator(
        service.clone(),
        vec![TableRecord::new(LOA, "a", wm("2000-01-01T00:00:00Z"))],
    );

    let report = orch.run_cycle(LOA).await;
    match report.outcome {
        SyncOutcome::Aborted { kind, reason } => {
            assert_eq!(kind, ErrorKind::Transport);
            assert!(reason.contains("connection refused"));
        }
        other => panic!("expected Aborted, got {other:?}"),
    }
    assert_eq!(service.get_table_calls(), 0);
}

#[tokio::test]
async fn hung_call_times_out() {
    let service = Arc::new(MockService::new(vec![(LOA, LastUpdate::Hang)]));
    let orch = orchestrator(service.clone(), Vec::new());

    let report = orch.run_cycle(LOA).await;
    match report.outcome {
        SyncOutcome::Aborted { kind, reason } => {
            assert_eq!(kind, ErrorKind::Transport);
            assert!(reason.contains("timed out"));
        }
        other => panic!("expected Aborted, got {other:?}"),
    }
    assert_eq!(service.get_table_calls(), 0);
}

#[tokio::test]
async fn get_table_failure_aborts() {
    let service =
        Arc::new(MockService::new(vec![(TAC, LastUpdate::Ok(REMOTE))]).failing_get_table());
    let orch = orchestrator(
        service.clone(),
        vec![TableRecord::new(TAC, "a", wm("2000-01-01T00:00:00Z"))],
    );

    let report = orch.run_cycle(TAC).await;
    assert!(report.outcome.is_aborted());
    assert_eq!(report.stale_count, 1);
    assert_eq!(service.get_table_calls(), 1);
}

#[tokio::test]
async fn reconcile_failure_aborts_with_storage_kind() {
    let service = Arc::new(MockService::new(vec![(TAC, LastUpdate::Ok(REMOTE))]));
    let store = Arc::new(InMemoryRecordStore::with_records([TableRecord::new(
        TAC,
        "a",
        wm("2000-01-01T00:00:00Z"),
    )]));
    let orch = Orchestrator::new(service.clone(), Arc::new(FailingReconciler), AppContext::new(store));

    let report = orch.run_cycle(TAC).await;
    assert!(matches!(
        report.outcome,
        SyncOutcome::Aborted {
            kind: ErrorKind::Storage,
            ..
        }
    ));
}

#[tokio::test]
async fn failed_get_table_status_is_skipped_without_reconcile() {
    let service = Arc::new(
        MockService::new(vec![(LOA, LastUpdate::Ok(REMOTE))]).get_table_status(StatusCode::Failure),
    );
    let store = Arc::new(InMemoryRecordStore::with_records([TableRecord::new(
        LOA,
        "a",
        wm("2000-01-01T00:00:00Z"),
    )]));
    let reconciler = Arc::new(CountingReconciler::default());
    let orch = Orchestrator::new(service.clone(), reconciler.clone(), AppContext::new(store));

    let report = orch.run_cycle(LOA).await;
    assert_eq!(
        report.outcome,
        SyncOutcome::Skipped {
            status: StatusCode::Failure
        }
    );
    assert_eq!(service.get_table_calls(), 1);
    assert_eq!(reconciler.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn successful_get_table_reaches_reconciler() {
    let service = Arc::new(MockService::new(vec![(LOA, LastUpdate::Ok(REMOTE))]));
    let store = Arc::new(InMemoryRecordStore::with_records([TableRecord::new(
        LOA,
        "a",
        wm("2000-01-01T00:00:00Z"),
    )]));
    let reconciler = Arc::new(CountingReconciler::default());
    let orch = Orchestrator::new(service, reconciler.clone(), AppContext::new(store));

    let report = orch.run_cycle(LOA).await;
    assert!(matches!(report.outcome, SyncOutcome::Synchronized { .. }));
    assert_eq!(reconciler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tables_are_independent() {
    let service = Arc::new(MockService::new(vec![
        (LOA, LastUpdate::Fail),
        (TAC, LastUpdate::Ok(REMOTE)),
    ]));
    let orch = orchestrator(service.clone(), Vec::new());

    let reports = orch.sync_all(&TableIdentifier::ALL).await;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].table, LOA);
    assert!(reports[0].outcome.is_aborted());
    assert_eq!(reports[1].table, TAC);
    assert_eq!(reports[1].outcome, SyncOutcome::UpToDate);
}

#[tokio::test]
async fn concurrent_cycles_for_same_table_are_single_flight() {
    let service = Arc::new(
        MockService::new(vec![(TAC, LastUpdate::Ok(REMOTE))]).with_delay(Duration::from_millis(50)),
    );
    let orch = orchestrator(service.clone(), Vec::new());

    let (a, b) = tokio::join!(orch.run_cycle(TAC), orch.run_cycle(TAC));
    let outcomes = [a.outcome, b.outcome];
    assert!(outcomes.contains(&SyncOutcome::UpToDate));
    assert!(outcomes.contains(&SyncOutcome::AlreadyRunning));
    assert_eq!(service.last_update_calls.load(Ordering::SeqCst), 1);

    let again = orch.run_cycle(TAC).await;
    assert_eq!(again.outcome, SyncOutcome::UpToDate);
}

#[tokio::test]
async fn store_is_not_written_by_default() {
    let service = Arc::new(MockService::new(vec![(TAC, LastUpdate::Ok(REMOTE))]));
    let store = Arc::new(InMemoryRecordStore::with_records([TableRecord::new(
        TAC,
        "a",
        wm("2000-01-01T00:00:00Z"),
    )]));
    let orch = Orchestrator::new(service, Arc::new(DeferredReconciler), AppContext::new(store.clone()));

    orch.run_cycle(TAC).await;
    assert_eq!(store.count(TAC).await.unwrap(), 1);
    assert_eq!(store.get(TAC, "a").unwrap().updated_at, wm("2000-01-01T00:00:00Z"));
}

#[tokio::test]
async fn scheduler_runs_immediately_and_repeats() {
    let service = Arc::new(MockService::new(vec![(TAC, LastUpdate::Ok(REMOTE))]));
    let scheduler = Scheduler::new(Arc::new(orchestrator(service.clone(), Vec::new())), vec![TAC]);

    let mut outcomes = Vec::new();
    let rounds = scheduler
        .run_with(
            Duration::from_millis(20),
            tokio::time::sleep(Duration::from_millis(150)),
            |reports| outcomes.extend(reports.iter().map(|r| r.outcome.clone())),
        )
        .await;

    assert!(rounds >= 2, "expected at least two rounds, got {rounds}");
    assert_eq!(outcomes.len(), rounds);
    assert!(outcomes.iter().all(|o| *o == SyncOutcome::UpToDate));
    assert!(service.last_update_calls.load(Ordering::SeqCst) >= rounds);
}

#[tokio::test]
async fn scheduler_stops_when_shutdown_is_ready() {
    let service = Arc::new(MockService::new(vec![(TAC, LastUpdate::Ok(REMOTE))]));
    let scheduler = Scheduler::new(Arc::new(orchestrator(service, Vec::new())), vec![TAC]);
    let rounds = scheduler
        .run(Duration::from_secs(3600), std::future::ready(()))
        .await;
    assert_eq!(rounds, 0);
}

//! Table synchronization against TRDM.
//!
//! For each table a cycle asks TRDM when the table last changed, compares
//! that watermark against local records, and fetches the table only when
//! something local is stale:
//!
//! ```text
//! CheckLastUpdate ──error──────────────▶ Aborted
//!        │ ──status != Successful──────▶ Skipped
//!        │ ──no stale records──────────▶ UpToDate
//!        ▼
//! FetchRequired ──getTable + reconcile─▶ Synchronized | Aborted
//! ```
//!
//! Requests go through a [`TableService`]: [`WsSecurityClient`] signs SOAP
//! envelopes, [`GatewayClient`] sends SigV4-signed JSON.

pub mod client;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod scheduler;
pub mod transport;

pub use client::{GatewayClient, TableService, WsSecurityClient};
pub use context::AppContext;
pub use error::{ErrorKind, SyncError, SyncResult};
pub use orchestrator::{
    CycleState, FlightGuard, Orchestrator, SingleFlight, SyncOutcome, SyncReport,
    DEFAULT_CALL_TIMEOUT,
};
pub use reconcile::{DeferredReconciler, ReconcileReport, Reconciler};
pub use scheduler::{Scheduler, DEFAULT_INTERVAL};
pub use transport::{GatewayTransport, HttpTransport, RawResponse, SoapRequest, SoapTransport};

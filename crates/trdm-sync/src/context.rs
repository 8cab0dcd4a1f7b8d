use std::sync::Arc;

use tracing::{info_span, Span};
use trdm_store::RecordStore;
use trdm_types::TableIdentifier;

/// What a sync cycle needs from the host application: the record store
/// and the span to log under.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn RecordStore>,
    pub span: Span,
}

impl AppContext {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_span(store, info_span!("trdm"))
    }

    pub fn with_span(store: Arc<dyn RecordStore>, span: Span) -> Self {
        Self { store, span }
    }

    /// Span for one table's cycle, nested under the context span.
    pub fn child(&self, table: TableIdentifier) -> Span {
        info_span!(parent: &self.span, "sync_cycle", table = %table)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext").field("span", &self.span).finish_non_exhaustive()
    }
}

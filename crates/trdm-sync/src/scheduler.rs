use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::info;
use trdm_types::TableIdentifier;

use crate::orchestrator::{Orchestrator, SyncReport};

/// Daily, matching the upstream table refresh cadence.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Runs `sync_all` now and then every `interval` until shut down.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    tables: Vec<TableIdentifier>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, tables: Vec<TableIdentifier>) -> Self {
        Self {
            orchestrator,
            tables,
        }
    }

    /// Returns the number of completed rounds once `shutdown` resolves.
    /// A round already in progress is abandoned at shutdown.
    pub async fn run<F>(&self, interval: Duration, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        self.run_with(interval, shutdown, |_| {}).await
    }

    /// Like [`run`](Self::run), handing each round's reports to `on_round`.
    pub async fn run_with<F, R>(&self, interval: Duration, shutdown: F, mut on_round: R) -> usize
    where
        F: Future<Output = ()>,
        R: FnMut(&[SyncReport]),
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut rounds = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(rounds, "scheduler shutting down");
                    return rounds;
                }
                _ = ticker.tick() => {
                    let round = tokio::select! {
                        biased;
                        _ = &mut shutdown => {
                            info!(rounds, "scheduler shutting down mid-round");
                            return rounds;
                        }
                        reports = self.orchestrator.sync_all(&self.tables) => reports,
                    };
                    rounds += 1;
                    on_round(&round);
                    info!(
                        round = rounds,
                        next_in_secs = interval.as_secs(),
                        "sync round complete"
                    );
                }
            }
        }
    }
}

//! Poller (C5)
//!
//! The scheduling loop: claim, fire-and-forget dispatch, idle sleep. Shaped
//! after the teacher's `TaskPoller::poll`/`wait` split in
//! `everruns-durable::worker::poller`, narrowed from the teacher's
//! adaptive-backoff batch claim to the single-row claim SPEC_FULL.md §4.5
//! describes, and with infrastructure failures routed back through a
//! one-shot channel instead of being returned from `poll` itself - the
//! teacher's `TaskPoller` has no equivalent because its task failures are
//! never fatal to the loop.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};
use trestle_core::{Clock, EngineConfig, EngineError, Result as EngineResult};
use trestle_store::StoreGateway;

use crate::runner::Runner;

/// Drives the claim/dispatch loop against one store and one runner.
pub struct Poller {
    store: Arc<dyn StoreGateway>,
    runner: Arc<Runner>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Poller {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        runner: Arc<Runner>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            runner,
            clock,
            config,
        }
    }

    /// Runs until `should_stop` returns true or a Runner surfaces an
    /// infrastructure failure. The first such failure wins; later ones
    /// (there can be more in flight from earlier dispatches) are dropped.
    #[instrument(skip(self, should_stop))]
    pub async fn poll(&self, mut should_stop: impl FnMut() -> bool + Send) -> EngineResult<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<EngineError>();

        loop {
            if should_stop() {
                return Ok(());
            }
            if let Ok(err) = rx.try_recv() {
                return Err(err);
            }

            let now = self.clock.now();
            let new_timeout_at = now
                + ChronoDuration::from_std(self.config.timeout_interval)
                    .unwrap_or_else(|_| ChronoDuration::zero());

            match self.store.claim_due(now, new_timeout_at).await {
                Ok(Some(workflow_id)) => {
                    info!(workflow_id = %workflow_id, "dispatching claimed workflow");
                    let runner = self.runner.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if let Err(err) = runner.run(workflow_id).await {
                            let _ = tx.send(err);
                        }
                    });

                    if let Ok(err) = rx.try_recv() {
                        return Err(err);
                    }
                }
                Ok(None) => {
                    debug!("no claimable workflow, sleeping");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(e) => return Err(EngineError::Store(e.into())),
            }
        }
    }
}

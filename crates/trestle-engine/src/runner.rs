//! Runner (C4)
//!
//! Executes a single claimed workflow to completion (finished, failed, or
//! aborted). Mirrors the teacher's "advisory, failures swallowed" treatment
//! of side-channel callbacks seen around `InMemoryRunner` shutdown handling,
//! applied here to the error-notification callback.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tracing::{instrument, warn};
use trestle_core::{Clock, EngineConfig, EngineError, Result as EngineResult, WorkflowStatus};
use trestle_store::{StoreError, StoreGateway};

use crate::context::WorkflowContext;
use crate::registry::HandlerRegistry;

/// Runs claimed workflows against one store, one registry, one clock.
pub struct Runner {
    store: Arc<dyn StoreGateway>,
    registry: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Runner {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        registry: Arc<HandlerRegistry>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            config,
        }
    }

    /// Resolve, invoke, and finalize one claimed instance.
    ///
    /// Only the two infrastructure failures - a vanished row, an unknown
    /// handler id - are returned as `Err`; a handler's own failure is
    /// recorded as a `failed`/`aborted` transition and this always returns
    /// `Ok(())` in that case.
    #[instrument(skip(self), fields(workflow_id = %workflow_id))]
    pub async fn run(&self, workflow_id: String) -> EngineResult<()> {
        let run_data = self
            .store
            .find_run_data(&workflow_id)
            .await
            .map_err(|e| map_store_not_found(e, || EngineError::workflow_not_found(&workflow_id)))?;

        let handler = self
            .registry
            .get(&run_data.handler_id)
            .ok_or_else(|| EngineError::handler_not_found(run_data.handler_id.clone()))?;

        let ctx = WorkflowContext::new(
            workflow_id.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.config.timeout_interval,
        );

        match handler(ctx, run_data.input).await {
            Ok(result) => {
                self.store
                    .mark_finished(&workflow_id, result)
                    .await
                    .map_err(|e| EngineError::Store(e.into()))?;
                tracing::info!(
                    workflow_id = %workflow_id,
                    handler_id = %run_data.handler_id,
                    "workflow finished"
                );
            }
            Err(err) => self.record_failure(&workflow_id, &run_data.handler_id, run_data.failures, &err).await?,
        }

        Ok(())
    }

    async fn record_failure(
        &self,
        workflow_id: &str,
        handler_id: &str,
        failures: i64,
        err: &anyhow::Error,
    ) -> EngineResult<()> {
        let new_failures = failures + 1;
        let new_status = match self.config.max_failures {
            Some(max) if new_failures > max as i64 => WorkflowStatus::Aborted,
            _ => WorkflowStatus::Failed,
        };
        let new_timeout_at =
            self.clock.now() + ChronoDuration::from_std(self.config.wait_retry_interval)
                .unwrap_or_else(|_| ChronoDuration::zero());

        self.store
            .mark_failure(workflow_id, new_status, new_timeout_at, new_failures)
            .await
            .map_err(|e| EngineError::Store(e.into()))?;

        tracing::warn!(
            workflow_id = %workflow_id,
            handler_id = %handler_id,
            failures = new_failures,
            status = %new_status,
            error = %err,
            "workflow handler failed"
        );

        if let Some(callback) = &self.config.error_callback {
            let callback = callback.clone();
            let workflow_id = workflow_id.to_string();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(&workflow_id, err)
            }));
            if result.is_err() {
                warn!(workflow_id = %workflow_id, "error-notification callback panicked; ignoring");
            }
        }

        Ok(())
    }
}

fn map_store_not_found(err: StoreError, not_found: impl FnOnce() -> EngineError) -> EngineError {
    match err {
        StoreError::NotFound(_) => not_found(),
        other => EngineError::Store(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trestle_core::FakeClock;
    use trestle_store::InMemoryStore;

    fn runner(
        store: Arc<dyn StoreGateway>,
        registry: Arc<HandlerRegistry>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Runner {
        Runner::new(store, registry, clock, config)
    }

    #[tokio::test]
    async fn missing_run_data_is_fatal() {
        let store: Arc<dyn StoreGateway> = Arc::new(InMemoryStore::new());
        let registry = Arc::new(HandlerRegistry::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::at_millis(1_000_000));
        let r = runner(store, registry, clock, EngineConfig::default());

        let err = r.run("missing".to_string()).await.unwrap_err();
        assert!(matches!(err, EngineError::WorkflowNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn missing_handler_is_fatal() {
        let store: Arc<dyn StoreGateway> = Arc::new(InMemoryStore::new());
        store
            .insert_instance("w1", "missing_handler", json!({}), now_fixture())
            .await
            .unwrap();
        let registry = Arc::new(HandlerRegistry::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::at_millis(1_000_000));
        let r = runner(store, registry, clock, EngineConfig::default());

        let err = r.run("w1".to_string()).await.unwrap_err();
        assert!(matches!(err, EngineError::HandlerNotFound(id) if id == "missing_handler"));
    }

    #[tokio::test]
    async fn successful_handler_marks_finished() {
        let store: Arc<dyn StoreGateway> = Arc::new(InMemoryStore::new());
        store
            .insert_instance("w1", "ok", json!({"x": 1}), now_fixture())
            .await
            .unwrap();
        let registry = Arc::new(HandlerRegistry::new());
        registry.register("ok", |_ctx, _input| async move { Ok(json!("ok")) });
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::at_millis(1_000_000));
        let r = runner(store.clone(), registry, clock, EngineConfig::default());

        r.run("w1".to_string()).await.unwrap();

        let status = store.find_status_and_result("w1").await.unwrap();
        assert_eq!(status.status, WorkflowStatus::Finished);
        assert_eq!(status.result, Some(json!("ok")));
    }

    #[tokio::test]
    async fn failing_handler_records_failed_not_aborted_below_max_failures() {
        let store: Arc<dyn StoreGateway> = Arc::new(InMemoryStore::new());
        store
            .insert_instance("w1", "always_fails", json!({}), now_fixture())
            .await
            .unwrap();
        let registry = Arc::new(HandlerRegistry::new());
        registry.register("always_fails", |_ctx, _input| async move {
            Err(anyhow::anyhow!("boom"))
        });
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::at_millis(1_000_000));
        let config = EngineConfig::default().with_max_failures(3);
        let r = runner(store.clone(), registry, clock, config);

        r.run("w1".to_string()).await.unwrap();

        let run_data = store.find_run_data("w1").await.unwrap();
        assert_eq!(run_data.failures, 1);
        let status = store.find_status_and_result("w1").await.unwrap();
        assert_eq!(status.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn exceeding_max_failures_aborts() {
        let store: Arc<dyn StoreGateway> = Arc::new(InMemoryStore::new());
        store
            .insert_instance("w1", "always_fails", json!({}), now_fixture())
            .await
            .unwrap();
        // Pre-seed failures = 3 so the next failure is the 4th, exceeding
        // max_failures = 3 per scenario 5 in SPEC_FULL.md §8.
        store
            .mark_failure("w1", WorkflowStatus::Failed, now_fixture(), 3)
            .await
            .unwrap();

        let registry = Arc::new(HandlerRegistry::new());
        registry.register("always_fails", |_ctx, _input| async move {
            Err(anyhow::anyhow!("boom"))
        });
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::at_millis(1_000_000));
        let config = EngineConfig::default().with_max_failures(3);
        let r = runner(store.clone(), registry, clock, config);

        r.run("w1".to_string()).await.unwrap();

        let run_data = store.find_run_data("w1").await.unwrap();
        assert_eq!(run_data.failures, 4);
        let status = store.find_status_and_result("w1").await.unwrap();
        assert_eq!(status.status, WorkflowStatus::Aborted);
    }

    fn now_fixture() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::UNIX_EPOCH + chrono::Duration::milliseconds(1_000_000)
    }
}

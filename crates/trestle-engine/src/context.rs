//! Workflow Context (C3)
//!
//! Per-run object bound to one `workflow_id`. A small struct carrying
//! references to the store gateway and the clock rather than a closure per
//! operation - SPEC_FULL.md §9 calls this out explicitly as the systems-
//! language shape of what the distilled spec describes as "factories".

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument};
use trestle_core::{Clock, Value};
use trestle_store::StoreGateway;

/// Bound to one claimed workflow instance; constructed fresh by the Runner
/// for every invocation (including replays).
pub struct WorkflowContext {
    workflow_id: String,
    store: Arc<dyn StoreGateway>,
    clock: Arc<dyn Clock>,
    timeout_interval: Duration,
}

impl WorkflowContext {
    pub(crate) fn new(
        workflow_id: String,
        store: Arc<dyn StoreGateway>,
        clock: Arc<dyn Clock>,
        timeout_interval: Duration,
    ) -> Self {
        Self {
            workflow_id,
            store,
            clock,
            timeout_interval,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Run `fn` at most once per `(workflow_id, step_id)`. If a recorded
    /// output already exists, returns it without invoking `fn`.
    ///
    /// `fn`'s own failure propagates unchanged and the step record is not
    /// written; the permitted crash windows between persisting the output
    /// and refreshing the lease are documented in SPEC_FULL.md §4.3.
    #[instrument(skip(self, f), fields(workflow_id = %self.workflow_id, step_id))]
    pub async fn step<F, Fut>(&self, step_id: &str, f: F) -> anyhow::Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Value>>,
    {
        if let Some(output) = self
            .store
            .find_step_output(&self.workflow_id, step_id)
            .await?
        {
            debug!(step_id, "step cache hit");
            return Ok(output);
        }

        debug!(step_id, "step cache miss, running fn");
        let output = f().await?;

        self.store
            .put_step_output(&self.workflow_id, step_id, output.clone())
            .await?;

        let new_timeout = self.clock.now() + ChronoDuration::from_std(self.timeout_interval)?;
        self.store
            .extend_lease(&self.workflow_id, new_timeout)
            .await?;

        Ok(output)
    }

    /// Suspend until `wake_up_at` for `nap_id`, committing to the wake
    /// instant only on first entry. A replay after a crash reads the
    /// already-committed instant rather than recomputing it.
    #[instrument(skip(self), fields(workflow_id = %self.workflow_id, nap_id))]
    pub async fn sleep(&self, nap_id: &str, ms: u64) -> anyhow::Result<()> {
        if let Some(wake_up_at) = self.store.find_nap_wake(&self.workflow_id, nap_id).await? {
            debug!(nap_id, "sleep resuming from recorded wake instant");
            let remaining = wake_up_at - self.clock.now();
            if remaining > ChronoDuration::zero() {
                tokio::time::sleep(remaining.to_std().unwrap_or(Duration::ZERO)).await;
            }
            return Ok(());
        }

        debug!(nap_id, "sleep first entry, committing wake instant");
        let wake_up_at = self.clock.now() + ChronoDuration::milliseconds(ms as i64);
        self.store
            .put_nap_wake(&self.workflow_id, nap_id, wake_up_at)
            .await?;

        let lease = wake_up_at + ChronoDuration::from_std(self.timeout_interval)?;
        self.store.extend_lease(&self.workflow_id, lease).await?;

        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trestle_core::FakeClock;
    use trestle_store::InMemoryStore;

    fn ctx(store: Arc<dyn StoreGateway>, clock: Arc<dyn Clock>) -> WorkflowContext {
        WorkflowContext::new("w1".to_string(), store, clock, Duration::from_millis(10_000))
    }

    #[tokio::test]
    async fn step_runs_fn_once_then_returns_cached_output() {
        let store: Arc<dyn StoreGateway> = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::at_millis(1_000_000));
        let ctx = ctx(store, clock);

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let output = ctx
            .step("s1", || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(json!("fresh"))
                }
            })
            .await
            .unwrap();
        assert_eq!(output, json!("fresh"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let calls_clone = calls.clone();
        let output = ctx
            .step("s1", || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(json!("should not run"))
                }
            })
            .await
            .unwrap();
        assert_eq!(output, json!("fresh"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn step_cache_hit_returns_preexisting_output_without_invoking_fn() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_step_output("w1", "s1", json!("cached"))
            .await
            .unwrap();
        let store: Arc<dyn StoreGateway> = store;
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::at_millis(1_000_000));
        let ctx = ctx(store, clock);

        let output = ctx
            .step("s1", || async { panic!("fn must not run on cache hit") })
            .await
            .unwrap();
        assert_eq!(output, json!("cached"));
    }

    #[tokio::test]
    async fn sleep_commits_wake_instant_once() {
        let store: Arc<dyn StoreGateway> = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::at_millis(1_000_000));
        let ctx = ctx(store.clone(), clock.clone());

        ctx.sleep("n1", 0).await.unwrap();
        let first = store.find_nap_wake("w1", "n1").await.unwrap().unwrap();

        // Re-entering after the wake instant with a different `ms` must not
        // revise the recorded instant.
        ctx.sleep("n1", 999_999).await.unwrap();
        let second = store.find_nap_wake("w1", "n1").await.unwrap().unwrap();
        assert_eq!(first, second);
    }
}

//! The Store Gateway trait (C1)
//!
//! All operations are async and fail with a `StoreError`. `claim_due` is the
//! one operation whose atomicity the rest of the system's correctness
//! depends on (SPEC_FULL.md §4.1) - implementations MUST perform it as a
//! single conditional update against the backing store, not a read followed
//! by a separate write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trestle_core::{RunData, StatusAndResult, Value, WorkflowStatus};

use crate::error::StoreError;

#[async_trait]
pub trait StoreGateway: Send + Sync + 'static {
    /// Insert a new instance with `status = idle`, `failures = 0`,
    /// `timeout_at = now`. Fails with `AlreadyExists` on id collision.
    async fn insert_instance(
        &self,
        workflow_id: &str,
        handler_id: &str,
        input: Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Atomically claim one instance with `status` in
    /// `WorkflowStatus::CLAIMABLE` and `timeout_at < now`, setting
    /// `status = running` and `timeout_at = new_timeout_at`. Returns `None`
    /// if no candidate exists. Ordering among candidates is unspecified but
    /// must not starve any instance whose `timeout_at` remains in the past.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        new_timeout_at: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError>;

    /// Projection of `(handler_id, input, failures)`. `NotFound` if absent.
    async fn find_run_data(&self, workflow_id: &str) -> Result<RunData, StoreError>;

    /// Projection of `(status, result)`. `NotFound` if absent.
    async fn find_status_and_result(
        &self,
        workflow_id: &str,
    ) -> Result<StatusAndResult, StoreError>;

    /// Transition to `finished` and record `result`. Does not touch
    /// `timeout_at` - the instance is terminal.
    async fn mark_finished(&self, workflow_id: &str, result: Value) -> Result<(), StoreError>;

    /// Transition to `failed` or `aborted`, push out `timeout_at`, and
    /// record the new failure count.
    async fn mark_failure(
        &self,
        workflow_id: &str,
        new_status: WorkflowStatus,
        new_timeout_at: DateTime<Utc>,
        new_failures: i64,
    ) -> Result<(), StoreError>;

    /// Refresh `timeout_at` only; status is left untouched.
    async fn extend_lease(
        &self,
        workflow_id: &str,
        new_timeout_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// `None` if no step record exists for `(workflow_id, step_id)`.
    async fn find_step_output(
        &self,
        workflow_id: &str,
        step_id: &str,
    ) -> Result<Option<Value>, StoreError>;

    /// Insert-only upsert: if a record already exists for `(workflow_id,
    /// step_id)` it is left untouched.
    async fn put_step_output(
        &self,
        workflow_id: &str,
        step_id: &str,
        output: Value,
    ) -> Result<(), StoreError>;

    /// `None` if no nap record exists for `(workflow_id, nap_id)`.
    async fn find_nap_wake(
        &self,
        workflow_id: &str,
        nap_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Insert-only upsert: if a record already exists for `(workflow_id,
    /// nap_id)` it is left untouched.
    async fn put_nap_wake(
        &self,
        workflow_id: &str,
        nap_id: &str,
        wake_up_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Closes the underlying connection. A no-op for the in-memory double.
    async fn close(&self);
}

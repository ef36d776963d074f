//! In-memory Store Gateway
//!
//! A test double standing in for Postgres so that C3/C4/C5 logic (the
//! replay protocol, the retry state machine) can be unit-tested without a
//! live database, mirroring `InMemoryWorkflowEventStore` in the teacher's
//! in-repo `everruns-durable` prototype. `claim_due` is atomic here simply
//! because the whole map is held behind one mutex for the duration of the
//! call - there is no SKIP LOCKED equivalent to get wrong.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use trestle_core::{RunData, StatusAndResult, Value, WorkflowStatus};

use crate::error::StoreError;
use crate::gateway::StoreGateway;

struct InstanceRow {
    handler_id: String,
    input: Value,
    failures: i64,
    status: WorkflowStatus,
    timeout_at: DateTime<Utc>,
    result: Option<Value>,
}

#[derive(Default)]
struct State {
    instances: HashMap<String, InstanceRow>,
    steps: HashMap<(String, String), Value>,
    naps: HashMap<(String, String), DateTime<Utc>>,
}

/// In-memory Store Gateway, backed by a single `tokio::sync::Mutex`.
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreGateway for InMemoryStore {
    async fn insert_instance(
        &self,
        workflow_id: &str,
        handler_id: &str,
        input: Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.instances.contains_key(workflow_id) {
            return Err(StoreError::AlreadyExists(workflow_id.to_string()));
        }
        state.instances.insert(
            workflow_id.to_string(),
            InstanceRow {
                handler_id: handler_id.to_string(),
                input,
                failures: 0,
                status: WorkflowStatus::Idle,
                timeout_at: now,
                result: None,
            },
        );
        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        new_timeout_at: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError> {
        let mut state = self.state.lock().await;
        let candidate = state
            .instances
            .iter()
            .filter(|(_, row)| WorkflowStatus::CLAIMABLE.contains(&row.status) && row.timeout_at < now)
            .min_by_key(|(_, row)| row.timeout_at)
            .map(|(id, _)| id.clone());

        if let Some(id) = &candidate {
            let row = state.instances.get_mut(id).expect("candidate exists");
            row.status = WorkflowStatus::Running;
            row.timeout_at = new_timeout_at;
        }

        Ok(candidate)
    }

    async fn find_run_data(&self, workflow_id: &str) -> Result<RunData, StoreError> {
        let state = self.state.lock().await;
        let row = state
            .instances
            .get(workflow_id)
            .ok_or_else(|| StoreError::NotFound(workflow_id.to_string()))?;
        Ok(RunData {
            handler_id: row.handler_id.clone(),
            input: row.input.clone(),
            failures: row.failures,
        })
    }

    async fn find_status_and_result(
        &self,
        workflow_id: &str,
    ) -> Result<StatusAndResult, StoreError> {
        let state = self.state.lock().await;
        let row = state
            .instances
            .get(workflow_id)
            .ok_or_else(|| StoreError::NotFound(workflow_id.to_string()))?;
        Ok(StatusAndResult {
            status: row.status,
            result: row.result.clone(),
        })
    }

    async fn mark_finished(&self, workflow_id: &str, result: Value) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(row) = state.instances.get_mut(workflow_id) {
            row.status = WorkflowStatus::Finished;
            row.result = Some(result);
        }
        Ok(())
    }

    async fn mark_failure(
        &self,
        workflow_id: &str,
        new_status: WorkflowStatus,
        new_timeout_at: DateTime<Utc>,
        new_failures: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(row) = state.instances.get_mut(workflow_id) {
            row.status = new_status;
            row.timeout_at = new_timeout_at;
            row.failures = new_failures;
        }
        Ok(())
    }

    async fn extend_lease(
        &self,
        workflow_id: &str,
        new_timeout_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(row) = state.instances.get_mut(workflow_id) {
            row.timeout_at = new_timeout_at;
        }
        Ok(())
    }

    async fn find_step_output(
        &self,
        workflow_id: &str,
        step_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .steps
            .get(&(workflow_id.to_string(), step_id.to_string()))
            .cloned())
    }

    async fn put_step_output(
        &self,
        workflow_id: &str,
        step_id: &str,
        output: Value,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .steps
            .entry((workflow_id.to_string(), step_id.to_string()))
            .or_insert(output);
        Ok(())
    }

    async fn find_nap_wake(
        &self,
        workflow_id: &str,
        nap_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .naps
            .get(&(workflow_id.to_string(), nap_id.to_string()))
            .copied())
    }

    async fn put_nap_wake(
        &self,
        workflow_id: &str,
        nap_id: &str,
        wake_up_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .naps
            .entry((workflow_id.to_string(), nap_id.to_string()))
            .or_insert(wake_up_at);
        Ok(())
    }

    async fn close(&self) {}
}

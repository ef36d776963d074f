//! Workflow instance model
//!
//! The workflow instance is the only mutable persisted entity in the system
//! (SPEC_FULL.md §3); everything in this module describes it or the
//! projections the Store Gateway returns of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, serializable payload carried as input, step output, nap wake
/// time, or workflow result. The engine never inspects its structure.
pub type Value = serde_json::Value;

/// The five states a workflow instance can occupy.
///
/// `Finished` and `Aborted` are terminal: no transition documented in
/// SPEC_FULL.md §4.5 leaves either of them. `Aborted` is excluded from the
/// claim predicate, so it is also dormant from the Poller's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Idle,
    Running,
    Failed,
    Aborted,
    Finished,
}

impl WorkflowStatus {
    /// The three statuses `claimDue` is allowed to select from.
    pub const CLAIMABLE: [WorkflowStatus; 3] = [Self::Idle, Self::Running, Self::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
            Self::Finished => "finished",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "failed" => Ok(Self::Failed),
            "aborted" => Ok(Self::Aborted),
            "finished" => Ok(Self::Finished),
            other => Err(format!("unknown workflow status: {other}")),
        }
    }
}

/// Projection returned by `findRunData`: everything the Runner needs to
/// resolve and invoke a handler.
#[derive(Debug, Clone)]
pub struct RunData {
    pub handler_id: String,
    pub input: Value,
    pub failures: i64,
}

/// Projection returned by `findStatusAndResult`: everything `wait` needs.
#[derive(Debug, Clone)]
pub struct StatusAndResult {
    pub status: WorkflowStatus,
    pub result: Option<Value>,
}

/// A step record: `(workflow_id, step_id) -> output`, write-once.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub workflow_id: String,
    pub step_id: String,
    pub output: Value,
}

/// A nap record: `(workflow_id, nap_id) -> wake_up_at`, write-once.
#[derive(Debug, Clone)]
pub struct NapRecord {
    pub workflow_id: String,
    pub nap_id: String,
    pub wake_up_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            WorkflowStatus::Idle,
            WorkflowStatus::Running,
            WorkflowStatus::Failed,
            WorkflowStatus::Aborted,
            WorkflowStatus::Finished,
        ] {
            assert_eq!(WorkflowStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(WorkflowStatus::from_str("zombie").is_err());
    }

    #[test]
    fn claimable_excludes_terminal_statuses() {
        assert!(!WorkflowStatus::CLAIMABLE.contains(&WorkflowStatus::Finished));
        assert!(!WorkflowStatus::CLAIMABLE.contains(&WorkflowStatus::Aborted));
    }
}

//! Error types for the workflow engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// The closed set of errors that cross the engine's public boundary.
///
/// Handler-produced errors never appear here: the Runner recovers from them
/// locally (records a failure/abort transition, optionally reports them via
/// the error callback) and never rethrows them. Only infrastructure failures
/// - a missing workflow row, a missing handler, a `wait` that ran out of
/// retries, or a duplicate `start` - surface through this type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Raised by `wait` and by the Runner when a claimed workflow's row has
    /// gone missing. Fatal to `poll` when raised from inside a Runner.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Raised by the Runner when no handler is registered under the
    /// claimed workflow's `handler_id`. Fatal to `poll`.
    #[error("handler not found: {0}")]
    HandlerNotFound(String),

    /// Raised by `wait` when its retry budget is exhausted before the
    /// workflow reaches `finished`.
    #[error("wait timed out for workflow: {0}")]
    WaitTimeout(String),

    /// Raised by `start` when `workflow_id` collides with an existing row.
    #[error("workflow already started: {0}")]
    WorkflowAlreadyStarted(String),

    /// Store I/O faults that aren't a unique-constraint collision propagate
    /// untyped, per SPEC_FULL.md §7.
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    pub fn workflow_not_found(id: impl Into<String>) -> Self {
        Self::WorkflowNotFound(id.into())
    }

    pub fn handler_not_found(id: impl Into<String>) -> Self {
        Self::HandlerNotFound(id.into())
    }

    pub fn wait_timeout(id: impl Into<String>) -> Self {
        Self::WaitTimeout(id.into())
    }

    pub fn workflow_already_started(id: impl Into<String>) -> Self {
        Self::WorkflowAlreadyStarted(id.into())
    }

    /// True for the two infrastructure failures that must terminate `poll`;
    /// false for everything else (including `wait`-only errors, which never
    /// reach the Poller).
    pub fn is_fatal_to_poll(&self) -> bool {
        matches!(self, Self::WorkflowNotFound(_) | Self::HandlerNotFound(_))
    }
}

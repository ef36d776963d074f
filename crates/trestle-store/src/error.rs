//! Store Gateway error taxonomy

use thiserror::Error;

/// Errors raised by `StoreGateway` implementations.
///
/// Everything that isn't a unique-index collision or a missing row is an
/// opaque `Database` fault, per SPEC_FULL.md §7 ("store I/O errors
/// propagate untyped; only the unique-constraint violation is translated").
#[derive(Debug, Error)]
pub enum StoreError {
    /// `insertInstance` collided with an existing `workflow_id`.
    #[error("workflow already exists: {0}")]
    AlreadyExists(String),

    /// A projection query (`findRunData`, `findStatusAndResult`) found no
    /// row for the given id.
    #[error("workflow not found: {0}")]
    NotFound(String),

    /// Any other I/O fault against the underlying store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

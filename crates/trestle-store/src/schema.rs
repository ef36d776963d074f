//! DDL for the three tables backing the Store Gateway.
//!
//! SPEC_FULL.md §4.1: "on initialization the gateway creates the required
//! unique indexes." `ensure_schema` runs these statements idempotently
//! rather than relying on an external migration runner, since this engine
//! ships no migration tooling of its own (see SPEC_FULL.md §1 - packaging
//! and connection setup are out of scope, but schema creation is the
//! gateway's own documented responsibility).

pub const CREATE_WORKFLOWS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS workflows (
    workflow_id TEXT PRIMARY KEY,
    handler_id  TEXT NOT NULL,
    input       JSONB NOT NULL,
    failures    BIGINT NOT NULL DEFAULT 0,
    status      TEXT NOT NULL,
    timeout_at  TIMESTAMPTZ NOT NULL,
    result      JSONB
)
"#;

pub const CREATE_WORKFLOWS_STATUS_TIMEOUT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS workflows_status_timeout_idx ON workflows (status, timeout_at)
"#;

pub const CREATE_STEPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS steps (
    workflow_id TEXT NOT NULL,
    step_id     TEXT NOT NULL,
    output      JSONB NOT NULL,
    PRIMARY KEY (workflow_id, step_id)
)
"#;

pub const CREATE_NAPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS naps (
    workflow_id TEXT NOT NULL,
    nap_id      TEXT NOT NULL,
    wake_up_at  TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (workflow_id, nap_id)
)
"#;

pub const ALL_STATEMENTS: &[&str] = &[
    CREATE_WORKFLOWS_TABLE,
    CREATE_WORKFLOWS_STATUS_TIMEOUT_INDEX,
    CREATE_STEPS_TABLE,
    CREATE_NAPS_TABLE,
];

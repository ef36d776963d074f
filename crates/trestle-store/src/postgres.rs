//! PostgreSQL implementation of the Store Gateway
//!
//! Uses a connection pool the way `everruns-storage::repositories::Database`
//! wraps a `PgPool`. `claim_due` follows the `SELECT ... FOR UPDATE SKIP
//! LOCKED` + `UPDATE ... RETURNING` shape the teacher's in-repo
//! `everruns-durable::persistence::postgres::claim_task` uses for its task
//! queue, narrowed to the single-row claim SPEC_FULL.md §4.1 describes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};
use trestle_core::{RunData, StatusAndResult, Value, WorkflowStatus};

use crate::error::StoreError;
use crate::gateway::StoreGateway;
use crate::schema;

/// PostgreSQL-backed Store Gateway.
///
/// Cheap to clone: internally an `Arc`-backed `PgPool`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and create the schema in one step.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the `workflows`/`steps`/`naps` tables and the
    /// `(status, timeout_at)` index if they don't already exist.
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in schema::ALL_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("store schema ensured");
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl StoreGateway for PostgresStore {
    #[instrument(skip(self, input))]
    async fn insert_instance(
        &self,
        workflow_id: &str,
        handler_id: &str,
        input: Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO workflows (workflow_id, handler_id, input, failures, status, timeout_at)
            VALUES ($1, $2, $3, 0, 'idle', $4)
            "#,
        )
        .bind(workflow_id)
        .bind(handler_id)
        .bind(&input)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::AlreadyExists(workflow_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        new_timeout_at: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            r#"
            WITH candidate AS (
                SELECT workflow_id
                FROM workflows
                WHERE status IN ('idle', 'running', 'failed')
                  AND timeout_at < $1
                ORDER BY timeout_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE workflows w
            SET status = 'running', timeout_at = $2
            FROM candidate c
            WHERE w.workflow_id = c.workflow_id
            RETURNING w.workflow_id
            "#,
        )
        .bind(now)
        .bind(new_timeout_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get::<String, _>("workflow_id")))
    }

    #[instrument(skip(self))]
    async fn find_run_data(&self, workflow_id: &str) -> Result<RunData, StoreError> {
        let row = sqlx::query(
            r#"SELECT handler_id, input, failures FROM workflows WHERE workflow_id = $1"#,
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(workflow_id.to_string()))?;

        Ok(RunData {
            handler_id: row.get("handler_id"),
            input: row.get("input"),
            failures: row.get("failures"),
        })
    }

    #[instrument(skip(self))]
    async fn find_status_and_result(
        &self,
        workflow_id: &str,
    ) -> Result<StatusAndResult, StoreError> {
        let row = sqlx::query(r#"SELECT status, result FROM workflows WHERE workflow_id = $1"#)
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(workflow_id.to_string()))?;

        let status: String = row.get("status");
        let status = status
            .parse::<WorkflowStatus>()
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(e.into())))?;

        Ok(StatusAndResult {
            status,
            result: row.get("result"),
        })
    }

    #[instrument(skip(self, result))]
    async fn mark_finished(&self, workflow_id: &str, result: Value) -> Result<(), StoreError> {
        sqlx::query(r#"UPDATE workflows SET status = 'finished', result = $2 WHERE workflow_id = $1"#)
            .bind(workflow_id)
            .bind(&result)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_failure(
        &self,
        workflow_id: &str,
        new_status: WorkflowStatus,
        new_timeout_at: DateTime<Utc>,
        new_failures: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE workflows
            SET status = $2, timeout_at = $3, failures = $4
            WHERE workflow_id = $1
            "#,
        )
        .bind(workflow_id)
        .bind(new_status.as_str())
        .bind(new_timeout_at)
        .bind(new_failures)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn extend_lease(
        &self,
        workflow_id: &str,
        new_timeout_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(r#"UPDATE workflows SET timeout_at = $2 WHERE workflow_id = $1"#)
            .bind(workflow_id)
            .bind(new_timeout_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_step_output(
        &self,
        workflow_id: &str,
        step_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query(
            r#"SELECT output FROM steps WHERE workflow_id = $1 AND step_id = $2"#,
        )
        .bind(workflow_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("output")))
    }

    #[instrument(skip(self, output))]
    async fn put_step_output(
        &self,
        workflow_id: &str,
        step_id: &str,
        output: Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO steps (workflow_id, step_id, output)
            VALUES ($1, $2, $3)
            ON CONFLICT (workflow_id, step_id) DO NOTHING
            "#,
        )
        .bind(workflow_id)
        .bind(step_id)
        .bind(&output)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_nap_wake(
        &self,
        workflow_id: &str,
        nap_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query(
            r#"SELECT wake_up_at FROM naps WHERE workflow_id = $1 AND nap_id = $2"#,
        )
        .bind(workflow_id)
        .bind(nap_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("wake_up_at")))
    }

    #[instrument(skip(self))]
    async fn put_nap_wake(
        &self,
        workflow_id: &str,
        nap_id: &str,
        wake_up_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO naps (workflow_id, nap_id, wake_up_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (workflow_id, nap_id) DO NOTHING
            "#,
        )
        .bind(workflow_id)
        .bind(nap_id)
        .bind(wake_up_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::queue::lease_expired_before;
use crate::{
    EnqueueOptions, Result, Task, TaskId, TaskQueue, TaskQueueError, TaskRecord,
    TaskStatus,
};

const TASK_COLUMNS: &str =
    "id, payload, queue, status, attempts, max_retries, run_at, last_error, created_at, updated_at";

/// PostgreSQL-backed task queue.
///
/// Claiming uses `FOR UPDATE SKIP LOCKED`, so several workers can poll the
/// same table without handing out a task twice.
#[derive(Clone)]
pub struct PostgresTaskQueue {
    pool: PgPool,
}

impl PostgresTaskQueue {
    /// Creates a new PostgreSQL task queue.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: &PgRow) -> Result<TaskRecord> {
        let payload: serde_json::Value = row.try_get("payload")?;
        let queue: String = row.try_get("queue")?;
        let status: String = row.try_get("status")?;
        let attempts: i32 = row.try_get("attempts")?;
        let max_retries: i32 = row.try_get("max_retries")?;

        Ok(TaskRecord {
            id: TaskId::from_uuid(row.try_get::<Uuid, _>("id")?),
            task: serde_json::from_value::<Task>(payload)?,
            queue: queue.parse().map_err(TaskQueueError::Corrupt)?,
            status: status.parse().map_err(TaskQueueError::Corrupt)?,
            attempts: u32::try_from(attempts)
                .map_err(|_| TaskQueueError::Corrupt(format!("negative attempts: {attempts}")))?,
            max_retries: u32::try_from(max_retries).map_err(|_| {
                TaskQueueError::Corrupt(format!("negative max_retries: {max_retries}"))
            })?,
            run_at: row.try_get("run_at")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskQueue for PostgresTaskQueue {
    async fn enqueue(&self, task: Task, options: EnqueueOptions) -> Result<TaskId> {
        let record = TaskRecord::new(task, options, Utc::now());
        let payload = serde_json::to_value(&record.task)?;

        sqlx::query(
            r#"
            INSERT INTO tasks (id, kind, payload, queue, priority, status, attempts, max_retries,
                               run_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $9, $9)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.task.kind())
        .bind(payload)
        .bind(record.queue.as_str())
        .bind(record.queue.priority())
        .bind(record.status.as_str())
        .bind(i32::try_from(record.max_retries).unwrap_or(i32::MAX))
        .bind(record.run_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(task_id = %record.id, kind = record.task.kind(), run_at = %record.run_at, "task enqueued");
        Ok(record.id)
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = 'running', attempts = attempts + 1, updated_at = $1
            WHERE id IN (
                SELECT id FROM tasks
                WHERE (status = 'pending' AND run_at <= $1)
                   OR (status = 'running' AND updated_at < $2)
                ORDER BY priority ASC, run_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(lease_expired_before(now))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = rows
            .iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>>>()?;
        // RETURNING does not preserve the subquery order.
        claimed.sort_by_key(|t| (t.queue.priority(), t.run_at));
        Ok(claimed)
    }

    async fn complete(&self, id: TaskId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'completed', updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TaskQueueError::NotFound(id));
        }
        Ok(())
    }

    async fn fail(&self, id: TaskId, error: &str, retry_at: DateTime<Utc>) -> Result<TaskStatus> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE tasks
            SET status = CASE WHEN attempts <= max_retries THEN 'pending' ELSE 'dead' END,
                run_at = CASE WHEN attempts <= max_retries THEN $3 ELSE run_at END,
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(id.as_uuid())
        .bind(error)
        .bind(retry_at)
        .fetch_optional(&self.pool)
        .await?;

        status
            .ok_or(TaskQueueError::NotFound(id))?
            .parse()
            .map_err(TaskQueueError::Corrupt)
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn with_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = $1 ORDER BY created_at ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{EnqueueOptions, Result, Task, TaskId, TaskRecord, TaskStatus};

/// How long a claimed task may stay `running` before another worker may
/// claim it again. Covers workers that died mid-task.
pub const RUNNING_LEASE: Duration = Duration::from_secs(5 * 60);

/// Durable queue of background tasks.
///
/// Tasks survive process restarts: a task is only gone once it has been
/// completed or has run out of retries.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Stores a task that becomes due after `options.delay`.
    async fn enqueue(&self, task: Task, options: EnqueueOptions) -> Result<TaskId>;

    /// Claims up to `limit` due tasks, most urgent queue first.
    ///
    /// Claimed tasks move to `running` with `attempts` incremented. Tasks left
    /// `running` for longer than [`RUNNING_LEASE`] are claimable again.
    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<TaskRecord>>;

    /// Marks a claimed task as done.
    async fn complete(&self, id: TaskId) -> Result<()>;

    /// Records a failed attempt.
    ///
    /// The task goes back to `pending` at `retry_at` while it has retries left
    /// and to `dead` otherwise. Returns the resulting status.
    async fn fail(&self, id: TaskId, error: &str, retry_at: DateTime<Utc>) -> Result<TaskStatus>;

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>>;

    /// Lists tasks in the given status, oldest first.
    async fn with_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>>;
}

pub(crate) fn lease_expired_before(now: DateTime<Utc>) -> DateTime<Utc> {
    now - chrono::Duration::seconds(RUNNING_LEASE.as_secs() as i64)
}

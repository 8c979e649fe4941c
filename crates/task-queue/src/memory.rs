use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::queue::lease_expired_before;
use crate::{
    EnqueueOptions, Result, Task, TaskId, TaskQueue, TaskQueueError, TaskRecord, TaskStatus,
};

/// In-memory task queue for testing and local development.
///
/// Not durable: tasks are lost when the process exits.
#[derive(Clone, Default)]
pub struct InMemoryTaskQueue {
    tasks: Arc<RwLock<Vec<TaskRecord>>>,
}

impl InMemoryTaskQueue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every task ever enqueued, in enqueue order.
    pub async fn all(&self) -> Vec<TaskRecord> {
        self.tasks.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

fn is_claimable(record: &TaskRecord, now: DateTime<Utc>) -> bool {
    match record.status {
        TaskStatus::Pending => record.run_at <= now,
        TaskStatus::Running => record.updated_at < lease_expired_before(now),
        TaskStatus::Completed | TaskStatus::Dead => false,
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: Task, options: EnqueueOptions) -> Result<TaskId> {
        let record = TaskRecord::new(task, options, Utc::now());
        let id = record.id;
        tracing::debug!(task_id = %id, kind = record.task.kind(), run_at = %record.run_at, "task enqueued");
        self.tasks.write().await.push(record);
        Ok(id)
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<TaskRecord>> {
        let mut tasks = self.tasks.write().await;

        let mut due: Vec<usize> = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| is_claimable(t, now))
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| (tasks[i].queue.priority(), tasks[i].run_at, i));
        due.truncate(limit);

        Ok(due
            .into_iter()
            .map(|i| {
                let task = &mut tasks[i];
                task.status = TaskStatus::Running;
                task.attempts += 1;
                task.updated_at = now;
                task.clone()
            })
            .collect())
    }

    async fn complete(&self, id: TaskId) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TaskQueueError::NotFound(id))?;
        task.status = TaskStatus::Completed;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn fail(&self, id: TaskId, error: &str, retry_at: DateTime<Utc>) -> Result<TaskStatus> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TaskQueueError::NotFound(id))?;

        task.last_error = Some(error.to_string());
        task.updated_at = Utc::now();
        if task.can_retry() {
            task.status = TaskStatus::Pending;
            task.run_at = retry_at;
        } else {
            task.status = TaskStatus::Dead;
        }
        Ok(task.status)
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        Ok(self.tasks.read().await.iter().find(|t| t.id == id).cloned())
    }

    async fn with_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>> {
        Ok(self
            .tasks
            .read()
            .await
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::QueueName;
    use common::OrderId;

    fn auto_release() -> Task {
        Task::AutoReleaseReservation {
            order_id: OrderId::new(),
        }
    }

    #[tokio::test]
    async fn delayed_task_is_not_due_yet() {
        let queue = InMemoryTaskQueue::new();
        let task = auto_release();
        let id = queue
            .enqueue(
                task.clone(),
                task.default_options().delay(Duration::from_secs(900)),
            )
            .await
            .unwrap();

        assert!(queue.claim_due(Utc::now(), 10).await.unwrap().is_empty());

        let later = Utc::now() + chrono::Duration::minutes(16);
        let claimed = queue.claim_due(later, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, id);
        assert_eq!(claimed[0].attempts, 1);
        assert_eq!(claimed[0].status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn critical_queue_is_claimed_first() {
        let queue = InMemoryTaskQueue::new();
        queue
            .enqueue(auto_release(), EnqueueOptions::new(QueueName::Low, 0))
            .await
            .unwrap();
        let critical = queue
            .enqueue(auto_release(), EnqueueOptions::new(QueueName::Critical, 5))
            .await
            .unwrap();

        let claimed = queue.claim_due(Utc::now(), 1).await.unwrap();
        assert_eq!(claimed[0].id, critical);
    }

    #[tokio::test]
    async fn claimed_task_is_not_claimed_twice() {
        let queue = InMemoryTaskQueue::new();
        queue
            .enqueue(auto_release(), EnqueueOptions::new(QueueName::Default, 0))
            .await
            .unwrap();

        let now = Utc::now();
        assert_eq!(queue.claim_due(now, 10).await.unwrap().len(), 1);
        assert!(queue.claim_due(now, 10).await.unwrap().is_empty());

        // After the lease runs out another worker may pick it up.
        let after_lease = now + chrono::Duration::minutes(6);
        let reclaimed = queue.claim_due(after_lease, 10).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].attempts, 2);
    }

    #[tokio::test]
    async fn failures_retry_then_die() {
        let queue = InMemoryTaskQueue::new();
        let id = queue
            .enqueue(auto_release(), EnqueueOptions::new(QueueName::Critical, 1))
            .await
            .unwrap();

        let now = Utc::now();
        queue.claim_due(now, 1).await.unwrap();
        let status = queue.fail(id, "boom", now).await.unwrap();
        assert_eq!(status, TaskStatus::Pending);

        queue.claim_due(now, 1).await.unwrap();
        let status = queue.fail(id, "boom again", now).await.unwrap();
        assert_eq!(status, TaskStatus::Dead);

        let record = queue.get(id).await.unwrap().unwrap();
        assert_eq!(record.attempts, 2);
        assert_eq!(record.last_error.as_deref(), Some("boom again"));
        assert_eq!(queue.with_status(TaskStatus::Dead).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn complete_unknown_task_fails() {
        let queue = InMemoryTaskQueue::new();
        assert!(matches!(
            queue.complete(TaskId::new()).await,
            Err(TaskQueueError::NotFound(_))
        ));
    }
}

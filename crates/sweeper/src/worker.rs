//! Polls the task queue and runs due tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use checkout::collaborators::Notifier;
use stock_ledger::StockLedger;
use task_queue::{Task, TaskQueue, TaskRecord, TaskStatus};
use tokio::sync::watch;

use crate::auto_release::AutoReleaser;
use crate::error::{Result, SweepError};

pub const CONFIRMATION_TEMPLATE: &str = "order_confirmation";

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,

    /// Tasks claimed per poll.
    pub batch_size: usize,

    /// Delay before the first retry; doubles on every further attempt.
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 10,
            base_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(600),
        }
    }
}

impl WorkerConfig {
    /// Delay before retrying a task that has been tried `attempts` times.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

pub struct TaskWorker<L: StockLedger> {
    queue: Arc<dyn TaskQueue>,
    releaser: AutoReleaser<L>,
    notifier: Arc<dyn Notifier>,
    config: WorkerConfig,
}

impl<L: StockLedger> TaskWorker<L> {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        releaser: AutoReleaser<L>,
        notifier: Arc<dyn Notifier>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            releaser,
            notifier,
            config,
        }
    }

    /// Claims and runs every task due at `now`, up to one batch.
    ///
    /// A task whose outcome cannot be written back is logged and left to its
    /// lease; the rest of the batch still runs. Returns the number of tasks
    /// claimed.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let claimed = self.queue.claim_due(now, self.config.batch_size).await?;
        let count = claimed.len();
        for record in claimed {
            let id = record.id;
            if let Err(e) = self.process(record, now).await {
                metrics::counter!("task_outcome_write_failures_total").increment(1);
                tracing::error!(task_id = %id, error = %e, "failed to record task outcome");
            }
        }
        Ok(count)
    }

    #[tracing::instrument(skip(self, record, now), fields(task_id = %record.id, kind = record.task.kind(), attempt = record.attempts))]
    async fn process(&self, record: TaskRecord, now: DateTime<Utc>) -> Result<()> {
        let kind = record.task.kind();
        match self.execute(&record.task).await {
            Ok(()) => {
                self.queue.complete(record.id).await?;
                metrics::counter!("tasks_processed_total", "kind" => kind).increment(1);
                tracing::debug!("task completed");
            }
            Err(e) => {
                metrics::counter!("tasks_failed_total", "kind" => kind).increment(1);
                let delay = chrono::Duration::from_std(self.config.backoff(record.attempts))
                    .unwrap_or(chrono::Duration::MAX);
                let retry_at = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
                let status = self.queue.fail(record.id, &e.to_string(), retry_at).await?;
                if status == TaskStatus::Dead {
                    tracing::error!(error = %e, "task failed permanently");
                } else {
                    tracing::warn!(error = %e, %retry_at, "task failed; will retry");
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        match task {
            Task::AutoReleaseReservation { order_id } => {
                let outcome = self.releaser.release_order(*order_id).await?;
                tracing::info!(%order_id, ?outcome, "auto-release handled");
                Ok(())
            }
            Task::SendOrderConfirmation {
                user_id,
                order_id,
                order_number,
                total,
            } => {
                let data = serde_json::json!({
                    "order_id": order_id,
                    "order_number": order_number,
                    "total": total,
                });
                self.notifier
                    .send(*user_id, CONFIRMATION_TEMPLATE, data)
                    .await
                    .map_err(SweepError::collaborator("notifier"))
            }
            Task::RecordCheckoutAnalytics {
                cart_id,
                user_id,
                order_id,
                item_count,
                total,
                duration_ms,
            } => {
                metrics::histogram!("checkout_basket_items").record(f64::from(*item_count));
                tracing::info!(
                    target: "checkout_analytics",
                    %cart_id,
                    %user_id,
                    %order_id,
                    item_count,
                    %total,
                    duration_ms,
                    "checkout recorded"
                );
                Ok(())
            }
        }
    }

    /// Polls until `shutdown` flips to true.
    ///
    /// Storage errors are logged and the loop keeps polling.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "task worker started"
        );
        while !*shutdown.borrow() {
            let busy = match self.run_once(Utc::now()).await {
                Ok(claimed) => claimed == self.config.batch_size,
                Err(e) => {
                    tracing::error!(error = %e, "task worker poll failed");
                    false
                }
            };
            if busy {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("task worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = WorkerConfig::default();
        assert_eq!(config.backoff(1), Duration::from_secs(5));
        assert_eq!(config.backoff(2), Duration::from_secs(10));
        assert_eq!(config.backoff(4), Duration::from_secs(40));
        assert_eq!(config.backoff(20), Duration::from_secs(600));
        assert_eq!(config.backoff(u32::MAX), Duration::from_secs(600));
    }
}

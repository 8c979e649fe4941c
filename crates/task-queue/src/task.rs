use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{CartId, OrderId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Background work enqueued by checkout and executed by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Task {
    /// Cancel an unpaid order and release its stock.
    AutoReleaseReservation { order_id: OrderId },

    /// Tell the customer their order was placed.
    SendOrderConfirmation {
        user_id: UserId,
        order_id: OrderId,
        order_number: String,
        total: Decimal,
    },

    /// Record checkout timing and basket figures.
    RecordCheckoutAnalytics {
        cart_id: CartId,
        user_id: UserId,
        order_id: OrderId,
        item_count: u32,
        total: Decimal,
        duration_ms: u64,
    },
}

impl Task {
    /// Stable name stored alongside the payload and used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Task::AutoReleaseReservation { .. } => "auto_release_reservation",
            Task::SendOrderConfirmation { .. } => "send_order_confirmation",
            Task::RecordCheckoutAnalytics { .. } => "record_checkout_analytics",
        }
    }

    /// Queue and retry policy for this kind of task, with no delay.
    ///
    /// | kind | queue | retries |
    /// |------|-------|---------|
    /// | auto-release | critical | 5 |
    /// | confirmation email | default | 3 |
    /// | analytics | low | 0 |
    pub fn default_options(&self) -> EnqueueOptions {
        match self {
            Task::AutoReleaseReservation { .. } => EnqueueOptions::new(QueueName::Critical, 5),
            Task::SendOrderConfirmation { .. } => EnqueueOptions::new(QueueName::Default, 3),
            Task::RecordCheckoutAnalytics { .. } => EnqueueOptions::new(QueueName::Low, 0),
        }
    }
}

/// Priority lane; critical tasks are always claimed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Critical,
    Default,
    Low,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Critical => "critical",
            QueueName::Default => "default",
            QueueName::Low => "low",
        }
    }

    /// Lower values are claimed first.
    pub fn priority(&self) -> i16 {
        match self {
            QueueName::Critical => 0,
            QueueName::Default => 1,
            QueueName::Low => 2,
        }
    }
}

impl std::str::FromStr for QueueName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(QueueName::Critical),
            "default" => Ok(QueueName::Default),
            "low" => Ok(QueueName::Low),
            other => Err(format!("unknown queue: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub queue: QueueName,

    /// Retries after the first attempt before the task is marked dead.
    pub max_retries: u32,

    /// The task becomes due this long after enqueueing.
    pub delay: Duration,
}

impl EnqueueOptions {
    pub fn new(queue: QueueName, max_retries: u32) -> Self {
        Self {
            queue,
            max_retries,
            delay: Duration::ZERO,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,

    /// Failed more times than its retry policy allows.
    Dead,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Dead => "dead",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "dead" => Ok(TaskStatus::Dead),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A task as stored in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub task: Task,
    pub queue: QueueName,
    pub status: TaskStatus,

    /// Number of times the task has been claimed.
    pub attempts: u32,
    pub max_retries: u32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub(crate) fn new(task: Task, options: EnqueueOptions, now: DateTime<Utc>) -> Self {
        let delay = chrono::Duration::from_std(options.delay).unwrap_or(chrono::Duration::MAX);
        Self {
            id: TaskId::new(),
            task,
            queue: options.queue,
            status: TaskStatus::Pending,
            attempts: 0,
            max_retries: options.max_retries,
            run_at: now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a failure on the current attempt leaves retries to spend.
    pub fn can_retry(&self) -> bool {
        self.attempts <= self.max_retries
    }
}

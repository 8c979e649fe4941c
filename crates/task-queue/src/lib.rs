//! Durable background task queue.
//!
//! Checkout enqueues follow-up work (auto-release timers, confirmation emails,
//! analytics) here instead of spawning it, so pending work outlives the
//! process. The sweeper's worker claims and runs due tasks.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod queue;
pub mod task;

pub use error::{Result, TaskQueueError};
pub use memory::InMemoryTaskQueue;
pub use postgres::PostgresTaskQueue;
pub use queue::{RUNNING_LEASE, TaskQueue};
pub use task::{EnqueueOptions, QueueName, Task, TaskId, TaskRecord, TaskStatus};

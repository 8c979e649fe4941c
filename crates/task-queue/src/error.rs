use thiserror::Error;

use crate::TaskId;

/// Errors that can occur when interacting with the task queue.
#[derive(Debug, Error)]
pub enum TaskQueueError {
    /// The task does not exist.
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    /// The payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be decoded.
    #[error("Corrupt task data: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for task queue operations.
pub type Result<T> = std::result::Result<T, TaskQueueError>;

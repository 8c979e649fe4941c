use checkout::CollaboratorError;
use inventory::InventoryError;
use task_queue::TaskQueueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Task queue error: {0}")]
    Queue(#[from] TaskQueueError),

    #[error("{collaborator} failed: {source}")]
    Collaborator {
        collaborator: &'static str,
        #[source]
        source: CollaboratorError,
    },
}

impl SweepError {
    pub(crate) fn collaborator(collaborator: &'static str) -> impl FnOnce(CollaboratorError) -> Self {
        move |source| SweepError::Collaborator {
            collaborator,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;

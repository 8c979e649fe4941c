use inventory::ItemAvailability;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::issue::{CheckoutIssue, IssueCode};
use crate::phase::{CheckoutPhase, PhaseResult};
use crate::promotion::PromoRejection;

/// Why a checkout stopped, and what it had done up to that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutFailure {
    pub phase: CheckoutPhase,
    pub issues: Vec<CheckoutIssue>,

    /// Per-item stock across warehouses, for stock-related failures.
    pub stock: Vec<ItemAvailability>,
    pub phases: Vec<PhaseResult>,
}

impl CheckoutFailure {
    /// True when the phase failed because a dependency was down rather
    /// than because of the cart itself.
    pub fn is_outage(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.code == IssueCode::CollaboratorUnavailable)
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Checkout failed in {}: {}", .0.phase, summarize(&.0.issues))]
    PhaseFailed(Box<CheckoutFailure>),

    #[error("{collaborator} unavailable: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    #[error("Promotion rejected: {0}")]
    PromoRejected(PromoRejection),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CheckoutError {
    pub(crate) fn collaborator(collaborator: &'static str, err: CollaboratorError) -> Self {
        CheckoutError::Collaborator {
            collaborator,
            message: err.to_string(),
        }
    }

    /// The failure details when a phase failed.
    pub fn failure(&self) -> Option<&CheckoutFailure> {
        match self {
            CheckoutError::PhaseFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

fn summarize(issues: &[CheckoutIssue]) -> String {
    issues
        .iter()
        .filter(|i| i.is_error())
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

//! Checkout saga over the reservation engine.
//!
//! [`CheckoutOrchestrator::checkout`] runs cart, address and promotion
//! validation, pricing, warehouse selection, stock reservation and order
//! creation in sequence. A failure in any phase releases whatever stock the
//! attempt had reserved. Follow-up work (auto-release, confirmation email,
//! analytics) is handed to the task queue.

mod attempt;
pub mod collaborators;
pub mod error;
pub mod issue;
pub mod orchestrator;
pub mod phase;
pub mod pricing;
pub mod promotion;

pub use attempt::ReservationOutcome;
pub use collaborators::{CollaboratorError, Collaborators};
pub use error::{CheckoutError, CheckoutFailure, Result};
pub use issue::{CheckoutIssue, IssueCode, Severity};
pub use orchestrator::{CheckoutConfig, CheckoutOrchestrator, CheckoutRequest, CheckoutResult};
pub use phase::{CheckoutPhase, PhaseResult, PhaseStatus};
pub use pricing::{PriceBreakdown, PricingPolicy, round_money};
pub use promotion::{
    PromoRejection, PromoValidation, PromotionService, check_promotion, discount_for,
    removal_reason,
};

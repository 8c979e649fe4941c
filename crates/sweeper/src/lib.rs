//! Timeout sweeper.
//!
//! - [`AutoReleaser`] cancels unpaid orders once their reservation hold runs
//!   out and hands their stock back.
//! - [`PromoSweeper`] strips expired, deactivated or exhausted promo codes
//!   from open carts, checking inactive users' carts less often.
//! - [`TaskWorker`] drains the task queue: auto-release, confirmation email
//!   and checkout analytics.

pub mod activity;
pub mod auto_release;
pub mod error;
pub mod promo_sweep;
pub mod worker;

pub use activity::{InMemoryUserActivity, UserActivity};
pub use auto_release::{AUTO_CANCEL_TEMPLATE, AutoReleaseOutcome, AutoReleaser};
pub use error::{Result, SweepError};
pub use promo_sweep::{PromoSweeper, SweepConfig, SweepReport};
pub use worker::{CONFIRMATION_TEMPLATE, TaskWorker, WorkerConfig};

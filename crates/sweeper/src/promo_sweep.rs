//! Periodic removal of dead promo codes from open carts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use checkout::collaborators::{Cart, CartStore, Promotion, PromotionStore};
use checkout::removal_reason;
use common::CartId;
use serde::Serialize;
use tokio::sync::watch;

use crate::activity::UserActivity;
use crate::error::{Result, SweepError};

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub batch_size: usize,

    /// Hard cap on batches per pass.
    pub max_iterations: usize,

    /// Users seen within this window have their carts checked every pass.
    pub active_window: chrono::Duration,

    /// Minimum time between checks of an inactive user's cart.
    pub inactive_cooldown: chrono::Duration,

    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_iterations: 50,
            active_window: chrono::Duration::hours(24),
            inactive_cooldown: chrono::Duration::hours(6),
            interval: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub checked: usize,
    pub removed: usize,

    /// Inactive carts still inside their cooldown.
    pub deferred: usize,

    /// True if the pass stopped at `max_iterations` with carts left to scan.
    pub truncated: bool,
}

pub struct PromoSweeper {
    carts: Arc<dyn CartStore>,
    promotions: Arc<dyn PromotionStore>,
    activity: Arc<dyn UserActivity>,
    config: SweepConfig,
}

impl PromoSweeper {
    pub fn new(
        carts: Arc<dyn CartStore>,
        promotions: Arc<dyn PromotionStore>,
        activity: Arc<dyn UserActivity>,
        config: SweepConfig,
    ) -> Self {
        Self {
            carts,
            promotions,
            activity,
            config,
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// One pass over every open cart that holds a promo code.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut promotions: HashMap<String, Option<Promotion>> = HashMap::new();
        let mut after: Option<CartId> = None;

        for iteration in 0.. {
            let batch = self
                .carts
                .carts_with_promo(after, self.config.batch_size)
                .await
                .map_err(SweepError::collaborator("carts"))?;
            if batch.is_empty() {
                break;
            }
            if iteration == self.config.max_iterations {
                report.truncated = true;
                tracing::warn!(
                    max_iterations = self.config.max_iterations,
                    scanned = report.scanned,
                    "promo sweep hit its iteration cap"
                );
                break;
            }

            let full = batch.len() == self.config.batch_size;
            for cart in batch {
                after = Some(cart.id);
                report.scanned += 1;
                if !self.is_due(&cart, now).await? {
                    report.deferred += 1;
                    continue;
                }
                report.checked += 1;
                if self.check_cart(&cart, &mut promotions, now).await? {
                    report.removed += 1;
                }
            }
            if !full {
                break;
            }
        }

        tracing::info!(
            scanned = report.scanned,
            checked = report.checked,
            removed = report.removed,
            deferred = report.deferred,
            "promo sweep finished"
        );
        Ok(report)
    }

    async fn is_due(&self, cart: &Cart, now: DateTime<Utc>) -> Result<bool> {
        if let Some(user_id) = cart.user_id {
            let last_active = self
                .activity
                .last_active_at(user_id)
                .await
                .map_err(SweepError::collaborator("user activity"))?;
            if last_active.is_some_and(|at| at >= now - self.config.active_window) {
                return Ok(true);
            }
        }
        Ok(cart
            .promo_checked_at
            .is_none_or(|at| at <= now - self.config.inactive_cooldown))
    }

    /// Returns whether the code was removed.
    async fn check_cart(
        &self,
        cart: &Cart,
        cache: &mut HashMap<String, Option<Promotion>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(code) = cart.promo_code.as_deref() else {
            return Ok(false);
        };
        if !cache.contains_key(code) {
            let promotion = self
                .promotions
                .get_promotion(code)
                .await
                .map_err(SweepError::collaborator("promotions"))?;
            cache.insert(code.to_string(), promotion);
        }
        let promotion = cache.get(code).and_then(Option::as_ref);

        match removal_reason(promotion, now) {
            Some(reason) => {
                self.carts
                    .set_promo_code(cart.id, None)
                    .await
                    .map_err(SweepError::collaborator("carts"))?;
                metrics::counter!("promo_sweep_removed_total").increment(1);
                tracing::info!(cart_id = %cart.id, code, %reason, "promo code removed from cart");
                Ok(true)
            }
            None => {
                self.carts
                    .touch_promo_checked(cart.id, now)
                    .await
                    .map_err(SweepError::collaborator("carts"))?;
                Ok(false)
            }
        }
    }

    /// Sweeps every `interval` until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.config.interval.as_secs(), "promo sweep scheduled");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        tracing::error!(error = %e, "promo sweep failed");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("promo sweep stopped");
    }
}

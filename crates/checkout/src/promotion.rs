//! Promotion validation, discount calculation and cart promo codes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CartId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::promotion::normalize_code;
use crate::collaborators::{CartStore, DiscountKind, OrderService, Promotion, PromotionStore};
use crate::error::{CheckoutError, Result};
use crate::pricing::round_money;

/// Why a promotion cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PromoRejection {
    #[error("promotion not found")]
    NotFound,

    #[error("promotion is inactive")]
    Inactive,

    #[error("promotion is not yet active")]
    NotYetActive,

    #[error("promotion has expired")]
    Expired,

    #[error("minimum order amount of {minimum} not met")]
    MinimumOrderNotMet { minimum: Decimal },

    #[error("usage limit reached")]
    UsageLimitReached,

    #[error("per-user limit reached")]
    PerUserLimitReached,

    #[error("valid on first order only")]
    FirstOrderOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoValidation {
    pub code: String,
    pub valid: bool,
    pub reason: Option<PromoRejection>,

    /// Zero unless `valid`.
    pub discount: Decimal,
}

impl PromoValidation {
    fn rejected(code: String, reason: PromoRejection) -> Self {
        Self {
            code,
            valid: false,
            reason: Some(reason),
            discount: Decimal::ZERO,
        }
    }
}

/// Checks that depend only on the promotion itself and the order amount.
pub fn check_promotion(
    promotion: &Promotion,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> std::result::Result<(), PromoRejection> {
    if !promotion.is_active {
        return Err(PromoRejection::Inactive);
    }
    if promotion.starts_at.is_some_and(|at| at > now) {
        return Err(PromoRejection::NotYetActive);
    }
    if promotion.is_expired(now) {
        return Err(PromoRejection::Expired);
    }
    if let Some(minimum) = promotion.min_order_amount
        && subtotal < minimum
    {
        return Err(PromoRejection::MinimumOrderNotMet { minimum });
    }
    if promotion.is_exhausted() {
        return Err(PromoRejection::UsageLimitReached);
    }
    Ok(())
}

/// Discount for `subtotal`, capped at `max_discount` and never above the subtotal.
pub fn discount_for(promotion: &Promotion, subtotal: Decimal) -> Decimal {
    let raw = match promotion.discount {
        DiscountKind::Percentage(percent) => subtotal * percent / Decimal::ONE_HUNDRED,
        DiscountKind::Fixed(amount) => amount,
    };
    let capped = promotion.max_discount.map_or(raw, |max| raw.min(max));
    round_money(capped.clamp(Decimal::ZERO, subtotal.max(Decimal::ZERO)))
}

/// Why the sweep should strip this promotion from carts, if it should.
pub fn removal_reason(promotion: Option<&Promotion>, now: DateTime<Utc>) -> Option<PromoRejection> {
    match promotion {
        None => Some(PromoRejection::NotFound),
        Some(p) if !p.is_active => Some(PromoRejection::Inactive),
        Some(p) if p.is_expired(now) => Some(PromoRejection::Expired),
        Some(p) if p.is_exhausted() => Some(PromoRejection::UsageLimitReached),
        Some(_) => None,
    }
}

pub struct PromotionService {
    promotions: Arc<dyn PromotionStore>,
    orders: Arc<dyn OrderService>,
    carts: Arc<dyn CartStore>,
}

impl PromotionService {
    pub fn new(
        promotions: Arc<dyn PromotionStore>,
        orders: Arc<dyn OrderService>,
        carts: Arc<dyn CartStore>,
    ) -> Self {
        Self {
            promotions,
            orders,
            carts,
        }
    }

    /// Validates `code` for an order of `subtotal`.
    ///
    /// Per-user and first-order rules only apply when `user_id` is known.
    #[tracing::instrument(skip(self))]
    pub async fn validate_promo(
        &self,
        code: &str,
        user_id: Option<UserId>,
        subtotal: Decimal,
    ) -> Result<PromoValidation> {
        let code = normalize_code(code);
        let promotion = self
            .promotions
            .get_promotion(&code)
            .await
            .map_err(|e| CheckoutError::collaborator("promotions", e))?;
        let Some(promotion) = promotion else {
            return Ok(PromoValidation::rejected(code, PromoRejection::NotFound));
        };

        if let Err(reason) = check_promotion(&promotion, subtotal, Utc::now()) {
            return Ok(PromoValidation::rejected(code, reason));
        }

        if let Some(user_id) = user_id {
            if let Some(limit) = promotion.per_user_limit {
                let used = self
                    .promotions
                    .user_usage_count(&code, user_id)
                    .await
                    .map_err(|e| CheckoutError::collaborator("promotions", e))?;
                if used >= limit {
                    return Ok(PromoValidation::rejected(
                        code,
                        PromoRejection::PerUserLimitReached,
                    ));
                }
            }
            if promotion.first_order_only {
                let orders = self
                    .orders
                    .order_count(user_id)
                    .await
                    .map_err(|e| CheckoutError::collaborator("orders", e))?;
                if orders > 0 {
                    return Ok(PromoValidation::rejected(code, PromoRejection::FirstOrderOnly));
                }
            }
        }

        Ok(PromoValidation {
            discount: discount_for(&promotion, subtotal),
            code,
            valid: true,
            reason: None,
        })
    }

    /// Validates `code` against the cart and stores it only if it is valid.
    #[tracing::instrument(skip(self))]
    pub async fn apply_promo_code(
        &self,
        cart_id: CartId,
        user_id: Option<UserId>,
        code: &str,
    ) -> Result<PromoValidation> {
        let cart = self
            .carts
            .get_cart(cart_id)
            .await
            .map_err(|e| CheckoutError::collaborator("carts", e))?
            .ok_or_else(|| CheckoutError::NotFound(format!("cart {cart_id}")))?;
        if cart.user_id.is_some() && cart.user_id != user_id {
            return Err(CheckoutError::NotFound(format!("cart {cart_id}")));
        }

        let subtotal: Decimal = cart
            .items
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();
        let validation = self.validate_promo(code, user_id, subtotal).await?;
        if let Some(reason) = validation.reason.clone() {
            return Err(CheckoutError::PromoRejected(reason));
        }

        self.carts
            .set_promo_code(cart_id, Some(validation.code.clone()))
            .await
            .map_err(|e| CheckoutError::collaborator("carts", e))?;
        tracing::info!(%cart_id, code = %validation.code, "promo code applied");
        Ok(validation)
    }

    pub async fn remove_promo_code(&self, cart_id: CartId) -> Result<()> {
        self.carts
            .set_promo_code(cart_id, None)
            .await
            .map_err(|e| CheckoutError::collaborator("carts", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        Cart, CartLine, InMemoryCartStore, InMemoryOrderService, InMemoryPromotionStore,
    };
    use chrono::Duration;
    use common::OrderId;
    use rust_decimal_macros::dec;

    struct Fixture {
        service: PromotionService,
        promotions: InMemoryPromotionStore,
        carts: InMemoryCartStore,
    }

    fn fixture() -> Fixture {
        let promotions = InMemoryPromotionStore::new();
        let carts = InMemoryCartStore::new();
        let service = PromotionService::new(
            Arc::new(promotions.clone()),
            Arc::new(InMemoryOrderService::new()),
            Arc::new(carts.clone()),
        );
        Fixture {
            service,
            promotions,
            carts,
        }
    }

    #[test]
    fn percentage_discount_is_capped() {
        let mut promo = Promotion::new("TENOFF", DiscountKind::Percentage(dec!(10)));
        assert_eq!(discount_for(&promo, dec!(80.00)), dec!(8.00));
        promo.max_discount = Some(dec!(5.00));
        assert_eq!(discount_for(&promo, dec!(80.00)), dec!(5.00));
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal() {
        let promo = Promotion::new("FLAT20", DiscountKind::Fixed(dec!(20.00)));
        assert_eq!(discount_for(&promo, dec!(12.50)), dec!(12.50));
    }

    #[test]
    fn static_checks() {
        let now = Utc::now();
        let mut promo = Promotion::new("X", DiscountKind::Fixed(dec!(1)));
        promo.min_order_amount = Some(dec!(30));
        assert_eq!(
            check_promotion(&promo, dec!(29.99), now),
            Err(PromoRejection::MinimumOrderNotMet { minimum: dec!(30) })
        );

        promo.starts_at = Some(now + Duration::hours(1));
        assert_eq!(
            check_promotion(&promo, dec!(40), now),
            Err(PromoRejection::NotYetActive)
        );

        promo.starts_at = None;
        promo.expires_at = Some(now - Duration::seconds(1));
        assert_eq!(check_promotion(&promo, dec!(40), now), Err(PromoRejection::Expired));
    }

    #[test]
    fn sweep_removal_reasons() {
        let now = Utc::now();
        let mut promo = Promotion::new("X", DiscountKind::Fixed(dec!(1)));
        assert_eq!(removal_reason(Some(&promo), now), None);

        promo.max_uses = Some(3);
        promo.current_uses = 3;
        assert_eq!(
            removal_reason(Some(&promo), now),
            Some(PromoRejection::UsageLimitReached)
        );
        assert_eq!(removal_reason(None, now), Some(PromoRejection::NotFound));
    }

    #[tokio::test]
    async fn exhausted_promo_is_rejected_without_touching_cart() {
        let f = fixture();
        let mut promo = Promotion::new("SPRING", DiscountKind::Percentage(dec!(15)));
        promo.max_uses = Some(100);
        promo.current_uses = 100;
        f.promotions.insert(promo).await;

        let user = UserId::new();
        let cart = Cart::new(
            Some(user),
            vec![CartLine {
                item_id: "SKU-1".into(),
                quantity: 2,
                unit_price: dec!(25.00),
            }],
        );
        let cart_id = cart.id;
        f.carts.insert(cart.clone()).await;

        let validation = f
            .service
            .validate_promo("spring", Some(user), dec!(50.00))
            .await
            .unwrap();
        assert!(!validation.valid);
        assert_eq!(validation.reason.as_ref().unwrap().to_string(), "usage limit reached");

        let err = f
            .service
            .apply_promo_code(cart_id, Some(user), "SPRING")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::PromoRejected(PromoRejection::UsageLimitReached)
        ));
        let after = f.carts.get_cart(cart_id).await.unwrap().unwrap();
        assert_eq!(after, cart);
    }

    #[tokio::test]
    async fn valid_promo_is_stored_normalized() {
        let f = fixture();
        f.promotions
            .insert(Promotion::new("WELCOME", DiscountKind::Fixed(dec!(5.00))))
            .await;
        let cart = Cart::new(
            None,
            vec![CartLine {
                item_id: "SKU-1".into(),
                quantity: 1,
                unit_price: dec!(30.00),
            }],
        );
        let cart_id = cart.id;
        f.carts.insert(cart).await;

        let validation = f
            .service
            .apply_promo_code(cart_id, None, " welcome ")
            .await
            .unwrap();
        assert_eq!(validation.discount, dec!(5.00));
        let stored = f.carts.get_cart(cart_id).await.unwrap().unwrap();
        assert_eq!(stored.promo_code.as_deref(), Some("WELCOME"));

        f.service.remove_promo_code(cart_id).await.unwrap();
        let stored = f.carts.get_cart(cart_id).await.unwrap().unwrap();
        assert_eq!(stored.promo_code, None);
    }

    #[tokio::test]
    async fn per_user_limit() {
        let f = fixture();
        let mut promo = Promotion::new("ONCE", DiscountKind::Fixed(dec!(2.00)));
        promo.per_user_limit = Some(1);
        f.promotions.insert(promo).await;

        let user = UserId::new();
        f.promotions
            .record_redemption("ONCE", user, OrderId::new())
            .await
            .unwrap();

        let validation = f
            .service
            .validate_promo("ONCE", Some(user), dec!(10))
            .await
            .unwrap();
        assert_eq!(validation.reason, Some(PromoRejection::PerUserLimitReached));

        let other = f
            .service
            .validate_promo("ONCE", Some(UserId::new()), dec!(10))
            .await
            .unwrap();
        assert!(other.valid);
    }
}

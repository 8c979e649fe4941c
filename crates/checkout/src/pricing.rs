//! Exact-decimal order pricing.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::collaborators::PaymentMethod;

/// Rounds a monetary amount to cents, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Fees and rates applied on top of the basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Applied to `subtotal - discount`.
    pub tax_rate: Decimal,
    pub shipping_fee: Decimal,

    /// Shipping is free when the subtotal reaches this amount.
    pub free_shipping_threshold: Decimal,
    pub cod_fee: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(10, 2),
            shipping_fee: Decimal::new(500, 2),
            free_shipping_threshold: Decimal::new(5000, 2),
            cod_fee: Decimal::new(200, 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub cod_fee: Decimal,
    pub total: Decimal,
}

impl PricingPolicy {
    /// `subtotal - discount + tax + shipping (+ cod_fee)`.
    ///
    /// The discount is clamped to the subtotal, so the taxable base is never
    /// negative. A negative subtotal gets no discount.
    pub fn price(
        &self,
        subtotal: Decimal,
        discount: Decimal,
        payment_method: PaymentMethod,
    ) -> PriceBreakdown {
        let subtotal = round_money(subtotal);
        let discount = round_money(discount.clamp(Decimal::ZERO, subtotal.max(Decimal::ZERO)));
        let tax = round_money((subtotal - discount) * self.tax_rate);
        let shipping = if subtotal >= self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.shipping_fee
        };
        let cod_fee = if payment_method.is_cash_on_delivery() {
            self.cod_fee
        } else {
            Decimal::ZERO
        };

        PriceBreakdown {
            subtotal,
            discount,
            tax,
            shipping,
            cod_fee,
            total: subtotal - discount + tax + shipping + cod_fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn small_card_order_pays_shipping() {
        let p = PricingPolicy::default().price(dec!(20.00), dec!(0), PaymentMethod::Card);
        assert_eq!(p.tax, dec!(2.00));
        assert_eq!(p.shipping, dec!(5.00));
        assert_eq!(p.cod_fee, dec!(0));
        assert_eq!(p.total, dec!(27.00));
    }

    #[test]
    fn threshold_is_inclusive_and_cod_adds_fee() {
        let p = PricingPolicy::default().price(
            dec!(50.00),
            dec!(5.00),
            PaymentMethod::CashOnDelivery,
        );
        assert_eq!(p.shipping, dec!(0));
        assert_eq!(p.tax, dec!(4.50));
        assert_eq!(p.total, dec!(51.50));
    }

    #[test]
    fn discount_never_exceeds_subtotal() {
        let p = PricingPolicy::default().price(dec!(10.00), dec!(25.00), PaymentMethod::Card);
        assert_eq!(p.discount, dec!(10.00));
        assert_eq!(p.tax, dec!(0.00));
        assert_eq!(p.total, dec!(5.00));
    }

    #[test]
    fn negative_subtotal_gets_no_discount() {
        let p = PricingPolicy::default().price(dec!(-1.00), dec!(0), PaymentMethod::Card);
        assert_eq!(p.discount, dec!(0));

        let p = PricingPolicy::default().price(dec!(-1.00), dec!(3.00), PaymentMethod::Card);
        assert_eq!(p.discount, dec!(0));
    }

    #[test]
    fn tax_rounds_half_away_from_zero() {
        // 0.025 -> 0.03
        let p = PricingPolicy::default().price(dec!(0.25), dec!(0), PaymentMethod::Card);
        assert_eq!(p.tax, dec!(0.03));
    }

    #[test]
    fn pricing_is_repeatable() {
        let policy = PricingPolicy::default();
        let a = policy.price(dec!(33.33), dec!(3.33), PaymentMethod::EWallet);
        let b = policy.price(dec!(33.33), dec!(3.33), PaymentMethod::EWallet);
        assert_eq!(a, b);
    }
}

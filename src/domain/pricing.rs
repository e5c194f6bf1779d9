use serde::Serialize;
use utoipa::ToSchema;

use super::loyalty;

/// Store-wide money rules. All amounts are whole VND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Tax rate in basis points (800 = 8%).
    pub tax_rate_bps: i64,
    pub free_shipping_threshold: i64,
    pub shipping_fee: i64,
    /// Order total needed to earn one loyalty point.
    pub vnd_per_earned_point: i64,
    /// Discount granted by one redeemed point.
    pub point_value_vnd: i64,
    /// Share of the order value that points may cover.
    pub max_redeem_percent: i64,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bps: 800,
            free_shipping_threshold: 500_000,
            shipping_fee: 30_000,
            vnd_per_earned_point: 10_000,
            point_value_vnd: 1_000,
            max_redeem_percent: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderTotals {
    pub subtotal: i64,
    pub tax_amount: i64,
    pub shipping_fee: i64,
    pub discount_amount: i64,
    pub points_redeemed: i64,
    pub points_discount: i64,
    pub total: i64,
    pub points_earned: i64,
}

impl PricingPolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.tax_rate_bps >= 0, "tax rate must not be negative");
        anyhow::ensure!(self.shipping_fee >= 0, "shipping fee must not be negative");
        anyhow::ensure!(
            self.free_shipping_threshold >= 0,
            "free shipping threshold must not be negative"
        );
        anyhow::ensure!(
            self.vnd_per_earned_point > 0,
            "VND per earned point must be positive"
        );
        anyhow::ensure!(self.point_value_vnd > 0, "point value must be positive");
        anyhow::ensure!(
            (0..=100).contains(&self.max_redeem_percent),
            "max redeem percent must be within 0..=100"
        );
        Ok(())
    }

    /// Tax on the subtotal, rounded half-up to the whole dong.
    pub fn tax_for(&self, subtotal: i64) -> i64 {
        if subtotal <= 0 {
            return 0;
        }
        (subtotal * self.tax_rate_bps + 5_000) / 10_000
    }

    pub fn shipping_for(&self, subtotal: i64) -> i64 {
        if subtotal >= self.free_shipping_threshold {
            0
        } else {
            self.shipping_fee
        }
    }

    /// Prices an order: tax and shipping on the subtotal, then the code
    /// discount, then at most one points redemption capped by the balance and
    /// `max_redeem_percent` of what is left.
    pub fn price_order(
        &self,
        subtotal: i64,
        code_discount: i64,
        requested_points: i64,
        points_balance: i64,
    ) -> OrderTotals {
        let subtotal = subtotal.max(0);
        let tax_amount = self.tax_for(subtotal);
        let shipping_fee = self.shipping_for(subtotal);
        let discount_amount = code_discount.clamp(0, subtotal);

        let order_value = (subtotal + tax_amount + shipping_fee - discount_amount).max(0);
        let points_redeemed =
            loyalty::redeemable_points(self, requested_points, points_balance, order_value);
        let points_discount = points_redeemed * self.point_value_vnd;

        let total = (order_value - points_discount).max(0);

        OrderTotals {
            subtotal,
            tax_amount,
            shipping_fee,
            discount_amount,
            points_redeemed,
            points_discount,
            total,
            points_earned: loyalty::earned_points(self, total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PricingPolicy {
        PricingPolicy::default()
    }

    fn assert_balanced(t: &OrderTotals) {
        assert_eq!(
            t.total,
            (t.subtotal + t.tax_amount + t.shipping_fee - t.discount_amount - t.points_discount)
                .max(0)
        );
        assert!(t.total >= 0);
    }

    #[test]
    fn small_order_pays_shipping_and_tax() {
        let t = policy().price_order(120_000, 0, 0, 0);
        assert_eq!(t.tax_amount, 9_600);
        assert_eq!(t.shipping_fee, 30_000);
        assert_eq!(t.total, 159_600);
        assert_eq!(t.points_earned, 15);
        assert_balanced(&t);
    }

    #[test]
    fn threshold_order_ships_free() {
        let t = policy().price_order(500_000, 0, 0, 0);
        assert_eq!(t.shipping_fee, 0);
        assert_eq!(t.tax_amount, 40_000);
        assert_eq!(t.total, 540_000);
        assert_eq!(t.points_earned, 54);
    }

    #[test]
    fn tax_rounds_half_up() {
        // 8% of 12_345 = 987.6
        assert_eq!(policy().tax_for(12_345), 988);
        // 8% of 6_250 = 500 exactly
        assert_eq!(policy().tax_for(6_250), 500);
        // 8% of 6_256 = 500.48
        assert_eq!(policy().tax_for(6_256), 500);
    }

    #[test]
    fn code_discount_never_exceeds_subtotal() {
        let t = policy().price_order(50_000, 80_000, 0, 0);
        assert_eq!(t.discount_amount, 50_000);
        assert_eq!(t.total, 4_000 + 30_000);
        assert_balanced(&t);
    }

    #[test]
    fn points_are_capped_by_balance() {
        let t = policy().price_order(1_000_000, 0, 100, 40);
        assert_eq!(t.points_redeemed, 40);
        assert_eq!(t.points_discount, 40_000);
        assert_eq!(t.total, 1_080_000 - 40_000);
        assert_balanced(&t);
    }

    #[test]
    fn points_are_capped_by_twenty_percent_of_order_value() {
        // order value 159_600, 20% = 31_920 -> 31 points
        let t = policy().price_order(120_000, 0, 500, 500);
        assert_eq!(t.points_redeemed, 31);
        assert!(t.points_discount * 100 <= 159_600 * 20);
        assert_eq!(t.total, 159_600 - 31_000);
        assert_balanced(&t);
    }

    #[test]
    fn cap_applies_after_code_discount() {
        let t = policy().price_order(600_000, 100_000, 1_000, 1_000);
        // value = 600_000 + 48_000 + 0 - 100_000 = 548_000, 20% = 109_600
        assert_eq!(t.points_redeemed, 109);
        assert_eq!(t.total, 548_000 - 109_000);
        assert_eq!(t.points_earned, 43);
    }

    #[test]
    fn negative_requests_redeem_nothing() {
        let t = policy().price_order(200_000, 0, -5, 1_000);
        assert_eq!(t.points_redeemed, 0);
        assert_eq!(t.points_discount, 0);
    }

    #[test]
    fn invalid_policies_are_rejected() {
        let mut p = policy();
        p.max_redeem_percent = 150;
        assert!(p.validate().is_err());
        let mut p = policy();
        p.vnd_per_earned_point = 0;
        assert!(p.validate().is_err());
        assert!(policy().validate().is_ok());
    }
}

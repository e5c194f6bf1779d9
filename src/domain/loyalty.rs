use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{pricing::PricingPolicy, str_enum};

str_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum LoyaltyKind {
        Earn => "EARN",
        Redeem => "REDEEM",
        Refund => "REFUND",
        Revoke => "REVOKE",
        Adjust => "ADJUST",
    }
}

/// Points that may actually be redeemed on an order worth `order_value`:
/// never more than requested, than the balance, or than the configured share
/// of the order value converted to points (rounded down).
pub fn redeemable_points(
    policy: &PricingPolicy,
    requested: i64,
    balance: i64,
    order_value: i64,
) -> i64 {
    if requested <= 0 || balance <= 0 || order_value <= 0 {
        return 0;
    }
    let cap_vnd = order_value * policy.max_redeem_percent / 100;
    let cap_points = cap_vnd / policy.point_value_vnd;
    requested.min(balance).min(cap_points).max(0)
}

pub fn earned_points(policy: &PricingPolicy, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    total / policy.vnd_per_earned_point
}

/// Applies a signed delta to a balance without letting it go negative.
/// Returns the delta actually applied and the new balance.
pub fn apply_delta(balance: i64, delta: i64) -> (i64, i64) {
    let next = (balance + delta).max(0);
    (next - balance, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redemption_respects_every_cap() {
        let p = PricingPolicy::default();
        for (requested, balance, value) in [
            (10, 1_000, 1_000_000),
            (5_000, 120, 1_000_000),
            (5_000, 5_000, 99_999),
            (0, 5_000, 1_000_000),
            (50, 50, 0),
        ] {
            let redeemed = redeemable_points(&p, requested, balance, value);
            assert!(redeemed <= requested.max(0));
            assert!(redeemed <= balance);
            assert!(redeemed * p.point_value_vnd * 100 <= value * p.max_redeem_percent);
        }
    }

    #[test]
    fn earning_rounds_down() {
        let p = PricingPolicy::default();
        assert_eq!(earned_points(&p, 9_999), 0);
        assert_eq!(earned_points(&p, 10_000), 1);
        assert_eq!(earned_points(&p, 159_600), 15);
        assert_eq!(earned_points(&p, -1), 0);
    }

    #[test]
    fn balance_never_goes_negative() {
        assert_eq!(apply_delta(30, -50), (-30, 0));
        assert_eq!(apply_delta(30, 20), (20, 50));
        assert_eq!(apply_delta(0, -1), (0, 0));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::str_enum;
use crate::error::AppError;

str_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum DiscountType {
        Percentage => "PERCENTAGE",
        Fixed => "FIXED",
    }
}

/// The parts of a discount code that decide whether it applies.
#[derive(Debug, Clone)]
pub struct DiscountRule {
    pub discount_type: DiscountType,
    pub value: i64,
    pub max_discount: Option<i64>,
    pub min_order_amount: i64,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub per_user_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

impl DiscountRule {
    /// Checks the rule for one user and order amount and returns the discount in VND.
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        order_amount: i64,
        user_usages: i64,
    ) -> Result<i64, AppError> {
        if !self.is_active {
            return Err(AppError::InvalidDiscount("Discount code is not active".into()));
        }
        if self.starts_at.is_some_and(|start| now < start) {
            return Err(AppError::InvalidDiscount(
                "Discount code is not yet valid".into(),
            ));
        }
        if self.expires_at.is_some_and(|end| now > end) {
            return Err(AppError::InvalidDiscount("Discount code has expired".into()));
        }
        if self
            .usage_limit
            .is_some_and(|limit| self.used_count >= limit)
        {
            return Err(AppError::InvalidDiscount(
                "Discount code usage limit reached".into(),
            ));
        }
        if self
            .per_user_limit
            .is_some_and(|limit| user_usages >= i64::from(limit))
        {
            return Err(AppError::InvalidDiscount(
                "You have already used this discount code".into(),
            ));
        }
        if order_amount < self.min_order_amount {
            return Err(AppError::InvalidDiscount(format!(
                "Order amount must be at least {} VND",
                self.min_order_amount
            )));
        }
        Ok(self.amount_for(order_amount))
    }

    pub fn amount_for(&self, order_amount: i64) -> i64 {
        if order_amount <= 0 {
            return 0;
        }
        let raw = match self.discount_type {
            DiscountType::Fixed => self.value,
            DiscountType::Percentage => {
                let pct = order_amount * self.value / 100;
                match self.max_discount {
                    Some(cap) => pct.min(cap),
                    None => pct,
                }
            }
        };
        raw.clamp(0, order_amount)
    }

    pub fn validate_definition(&self) -> Result<(), AppError> {
        if self.value <= 0 {
            return Err(AppError::BadRequest("value must be greater than 0".into()));
        }
        if self.discount_type == DiscountType::Percentage && self.value > 100 {
            return Err(AppError::BadRequest(
                "percentage discount cannot exceed 100".into(),
            ));
        }
        if self.min_order_amount < 0 || self.max_discount.is_some_and(|cap| cap <= 0) {
            return Err(AppError::BadRequest(
                "amounts must not be negative".into(),
            ));
        }
        if self.usage_limit.is_some_and(|l| l <= 0) || self.per_user_limit.is_some_and(|l| l <= 0)
        {
            return Err(AppError::BadRequest("limits must be greater than 0".into()));
        }
        if let (Some(start), Some(end)) = (self.starts_at, self.expires_at) {
            if end <= start {
                return Err(AppError::BadRequest(
                    "expires_at must be after starts_at".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn rule() -> DiscountRule {
        DiscountRule {
            discount_type: DiscountType::Percentage,
            value: 10,
            max_discount: Some(50_000),
            min_order_amount: 100_000,
            usage_limit: Some(100),
            used_count: 0,
            per_user_limit: Some(1),
            starts_at: None,
            expires_at: None,
            is_active: true,
        }
    }

    #[test]
    fn percentage_is_capped() {
        let r = rule();
        assert_eq!(r.evaluate(Utc::now(), 200_000, 0).unwrap(), 20_000);
        assert_eq!(r.evaluate(Utc::now(), 1_000_000, 0).unwrap(), 50_000);
    }

    #[test]
    fn fixed_never_exceeds_amount() {
        let r = DiscountRule {
            discount_type: DiscountType::Fixed,
            value: 300_000,
            min_order_amount: 0,
            ..rule()
        };
        assert_eq!(r.amount_for(120_000), 120_000);
    }

    #[test]
    fn minimum_order_amount_enforced() {
        let err = rule().evaluate(Utc::now(), 99_999, 0).unwrap_err();
        assert!(matches!(err, AppError::InvalidDiscount(_)));
    }

    #[test]
    fn usage_caps_enforced() {
        let exhausted = DiscountRule {
            used_count: 100,
            ..rule()
        };
        assert!(exhausted.evaluate(Utc::now(), 200_000, 0).is_err());
        assert!(rule().evaluate(Utc::now(), 200_000, 1).is_err());
        let unlimited = DiscountRule {
            usage_limit: None,
            per_user_limit: None,
            used_count: 10_000,
            ..rule()
        };
        assert!(unlimited.evaluate(Utc::now(), 200_000, 7).is_ok());
    }

    #[test]
    fn date_window_enforced() {
        let now = Utc::now();
        let future = DiscountRule {
            starts_at: Some(now + Duration::days(1)),
            ..rule()
        };
        assert!(future.evaluate(now, 200_000, 0).is_err());
        let expired = DiscountRule {
            expires_at: Some(now - Duration::seconds(1)),
            ..rule()
        };
        assert!(expired.evaluate(now, 200_000, 0).is_err());
        let inactive = DiscountRule {
            is_active: false,
            ..rule()
        };
        assert!(inactive.evaluate(now, 200_000, 0).is_err());
    }

    #[test]
    fn definitions_are_validated() {
        assert!(rule().validate_definition().is_ok());
        let too_much = DiscountRule {
            value: 120,
            ..rule()
        };
        assert!(too_much.validate_definition().is_err());
        let now = Utc::now();
        let backwards = DiscountRule {
            starts_at: Some(now),
            expires_at: Some(now - Duration::days(1)),
            ..rule()
        };
        assert!(backwards.validate_definition().is_err());
    }

    #[test]
    fn codes_are_normalized() {
        assert_eq!(normalize_code("  summer10 "), "SUMMER10");
    }
}

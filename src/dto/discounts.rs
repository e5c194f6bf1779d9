use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{domain::discount::DiscountType, models::DiscountCode};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDiscountRequest {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub value: i64,
    pub max_discount: Option<i64>,
    pub min_order_amount: Option<i64>,
    pub usage_limit: Option<i32>,
    pub per_user_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateDiscountRequest {
    pub description: Option<String>,
    pub value: Option<i64>,
    pub max_discount: Option<i64>,
    pub min_order_amount: Option<i64>,
    pub usage_limit: Option<i32>,
    pub per_user_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateDiscountRequest {
    pub code: String,
    pub order_amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountQuote {
    pub code: String,
    pub discount_amount: i64,
    pub final_amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountList {
    pub items: Vec<DiscountCode>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    categories, discount_codes, loyalty_transactions, order_items, order_status_history, orders,
    product_variants, products, users,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub loyalty_points: i64,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub price_adjustment: i64,
    pub stock: i32,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: String,
    pub payment_status: String,
    pub fulfillment_status: String,
    pub payment_method: String,
    pub subtotal: i64,
    pub tax_amount: i64,
    pub shipping_fee: i64,
    pub discount_amount: i64,
    pub points_discount: i64,
    pub total: i64,
    pub points_redeemed: i64,
    pub points_earned: i64,
    pub recipient_name: String,
    pub phone: String,
    pub address_line: String,
    pub city: String,
    pub note: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub sku: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub line_total: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderStatusChange {
    pub from_status: Option<String>,
    pub to_status: String,
    pub note: Option<String>,
    pub changed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DiscountCode {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: String,
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

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoyaltyEntry {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub kind: String,
    pub points: i64,
    pub balance_after: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            full_name: model.full_name,
            phone: model.phone,
            role: model.role,
            loyalty_points: model.loyalty_points,
            email_verified: model.email_verified,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<categories::Model> for Category {
    fn from(model: categories::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            slug: model.slug,
            description: model.description,
            parent_id: model.parent_id,
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<products::Model> for Product {
    fn from(model: products::Model) -> Self {
        Self {
            id: model.id,
            category_id: model.category_id,
            name: model.name,
            slug: model.slug,
            sku: model.sku,
            description: model.description,
            price: model.price,
            stock: model.stock,
            image_url: model.image_url,
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<product_variants::Model> for ProductVariant {
    fn from(model: product_variants::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            name: model.name,
            sku: model.sku,
            price_adjustment: model.price_adjustment,
            stock: model.stock,
            is_active: model.is_active,
        }
    }
}

impl From<orders::Model> for Order {
    fn from(model: orders::Model) -> Self {
        Self {
            id: model.id,
            order_number: model.order_number,
            user_id: model.user_id,
            status: model.status,
            payment_status: model.payment_status,
            fulfillment_status: model.fulfillment_status,
            payment_method: model.payment_method,
            subtotal: model.subtotal,
            tax_amount: model.tax_amount,
            shipping_fee: model.shipping_fee,
            discount_amount: model.discount_amount,
            points_discount: model.points_discount,
            total: model.total,
            points_redeemed: model.points_redeemed,
            points_earned: model.points_earned,
            recipient_name: model.recipient_name,
            phone: model.phone,
            address_line: model.address_line,
            city: model.city,
            note: model.note,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<order_items::Model> for OrderItem {
    fn from(model: order_items::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            variant_id: model.variant_id,
            product_name: model.product_name,
            variant_name: model.variant_name,
            sku: model.sku,
            unit_price: model.unit_price,
            quantity: model.quantity,
            line_total: model.line_total,
        }
    }
}

impl From<order_status_history::Model> for OrderStatusChange {
    fn from(model: order_status_history::Model) -> Self {
        Self {
            from_status: model.from_status,
            to_status: model.to_status,
            note: model.note,
            changed_by: model.changed_by,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<discount_codes::Model> for DiscountCode {
    fn from(model: discount_codes::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            description: model.description,
            discount_type: model.discount_type,
            value: model.value,
            max_discount: model.max_discount,
            min_order_amount: model.min_order_amount,
            usage_limit: model.usage_limit,
            used_count: model.used_count,
            per_user_limit: model.per_user_limit,
            starts_at: model.starts_at.map(|dt| dt.with_timezone(&Utc)),
            expires_at: model.expires_at.map(|dt| dt.with_timezone(&Utc)),
            is_active: model.is_active,
        }
    }
}

impl From<loyalty_transactions::Model> for LoyaltyEntry {
    fn from(model: loyalty_transactions::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            kind: model.kind,
            points: model.points,
            balance_after: model.balance_after,
            note: model.note,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    domain::status::PaymentMethod,
    models::{Order, OrderItem, OrderStatusChange},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub recipient_name: String,
    pub phone: String,
    pub address_line: String,
    pub city: String,
    pub note: Option<String>,
    pub payment_method: PaymentMethod,
    pub discount_code: Option<String>,
    pub redeem_points: Option<i64>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<OrderStatusChange>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

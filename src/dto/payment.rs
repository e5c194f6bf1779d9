use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentUrlRequest {
    pub order_id: Uuid,
    pub bank_code: Option<String>,
    /// `vn` (default) or `en`.
    pub locale: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentUrlResponse {
    pub payment_url: String,
    pub order_number: String,
    pub amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentReturnResult {
    pub order_number: String,
    pub success: bool,
    pub response_code: String,
    pub message: String,
    pub payment_status: Option<String>,
}

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
};

use crate::{
    dto::payment::{CreatePaymentUrlRequest, PaymentReturnResult, PaymentUrlResponse},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
    vnpay::IpnReply,
};

const FALLBACK_IP: &str = "127.0.0.1";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/vnpay/create-url", post(create_payment_url))
        .route("/vnpay/return", get(vnpay_return))
        .route("/vnpay/ipn", get(vnpay_ipn))
}

/// First address of `X-Forwarded-For`, then `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(FALLBACK_IP)
        .to_string()
}

#[utoipa::path(
    post,
    path = "/api/payment/vnpay/create-url",
    request_body = CreatePaymentUrlRequest,
    responses(
        (status = 200, description = "Signed VNPay redirect URL", body = ApiResponse<PaymentUrlResponse>),
        (status = 400, description = "Order is not payable through VNPay"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payment"
)]
pub async fn create_payment_url(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<CreatePaymentUrlRequest>,
) -> AppResult<Json<ApiResponse<PaymentUrlResponse>>> {
    let resp =
        payment_service::create_payment_url(&state, &user, payload, client_ip(&headers)).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/payment/vnpay/return",
    responses(
        (status = 200, description = "Payment result for the browser redirect", body = ApiResponse<PaymentReturnResult>),
        (status = 400, description = "Bad signature or amount")
    ),
    tag = "Payment"
)]
pub async fn vnpay_return(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> AppResult<Json<ApiResponse<PaymentReturnResult>>> {
    Ok(Json(payment_service::handle_return(&state, params).await?))
}

#[utoipa::path(
    get,
    path = "/api/payment/vnpay/ipn",
    responses(
        (status = 200, description = "Acknowledgement for the gateway", body = IpnReply)
    ),
    tag = "Payment"
)]
pub async fn vnpay_ipn(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Json<IpnReply> {
    Json(payment_service::handle_ipn(&state, params).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), FALLBACK_IP);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers), "10.0.0.9");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }
}

use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait, sea_query::LockType,
};

use crate::{
    audit,
    domain::status::{OrderStatus, PaymentMethod, PaymentStatus},
    dto::payment::{CreatePaymentUrlRequest, PaymentReturnResult, PaymentUrlResponse},
    entity::orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    services::order_service,
    state::AppState,
    vnpay::{IpnOutcome, IpnReply, PaymentRequest, VnpayCallback, describe_response_code},
};

pub async fn create_payment_url(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePaymentUrlRequest,
    client_ip: String,
) -> AppResult<ApiResponse<PaymentUrlResponse>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(payload.order_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    if order.payment_method.parse::<PaymentMethod>()? != PaymentMethod::Vnpay {
        return Err(AppError::BadRequest("Order is not paid through VNPay".into()));
    }
    let status = order.status.parse::<OrderStatus>()?;
    if status.is_terminal() {
        return Err(AppError::Conflict(format!("Order is {status}")));
    }
    match order.payment_status.parse::<PaymentStatus>()? {
        PaymentStatus::Pending | PaymentStatus::Failed => {}
        other => return Err(AppError::Conflict(format!("Order payment is {other}"))),
    }

    let request = PaymentRequest {
        txn_ref: order.order_number.clone(),
        amount: order.total,
        order_info: format!("Thanh toan don hang {}", order.order_number),
        ip_addr: client_ip,
        bank_code: payload.bank_code,
        locale: payload.locale,
        created_at: Utc::now(),
    };
    let payment_url = state.vnpay.build_payment_url(&request)?;

    tracing::info!(order_number = %order.order_number, amount = order.total, "vnpay url created");

    Ok(ApiResponse::success(
        "Payment URL created",
        PaymentUrlResponse {
            payment_url,
            order_number: order.order_number,
            amount: order.total,
        },
        Some(Meta::empty()),
    ))
}

/// Outcome of processing one return/IPN callback.
#[derive(Debug)]
pub struct CallbackResult {
    pub outcome: IpnOutcome,
    pub callback: Option<VnpayCallback>,
    pub payment_status: Option<PaymentStatus>,
}

impl CallbackResult {
    fn bare(outcome: IpnOutcome) -> Self {
        Self {
            outcome,
            callback: None,
            payment_status: None,
        }
    }
}

/// Verifies the callback and records the payment result. Replays of an
/// already settled order change nothing.
pub async fn apply_callback(state: &AppState, params: &BTreeMap<String, String>) -> CallbackResult {
    let check = state.vnpay.verify(params);
    if !check.is_trusted() {
        tracing::warn!(?check, txn_ref = ?params.get("vnp_TxnRef"), "vnpay signature rejected");
        return CallbackResult::bare(IpnOutcome::InvalidSignature);
    }

    let callback = match VnpayCallback::from_params(params) {
        Ok(cb) => cb,
        Err(err) => {
            tracing::warn!(error = %err, "malformed vnpay callback");
            return CallbackResult::bare(IpnOutcome::UnknownError);
        }
    };

    match settle(state, &callback).await {
        Ok((outcome, payment_status)) => CallbackResult {
            outcome,
            callback: Some(callback),
            payment_status,
        },
        Err(err) => {
            tracing::error!(error = %err, txn_ref = %callback.txn_ref, "vnpay callback failed");
            CallbackResult {
                outcome: IpnOutcome::UnknownError,
                callback: Some(callback),
                payment_status: None,
            }
        }
    }
}

async fn settle(
    state: &AppState,
    callback: &VnpayCallback,
) -> AppResult<(IpnOutcome, Option<PaymentStatus>)> {
    let txn = state.orm.begin().await?;

    let Some(order) = Orders::find()
        .filter(OrderCol::OrderNumber.eq(callback.txn_ref.clone()))
        .lock(LockType::Update)
        .one(&txn)
        .await?
    else {
        return Ok((IpnOutcome::OrderNotFound, None));
    };

    if !callback.matches_amount(order.total) {
        tracing::warn!(
            order_number = %order.order_number,
            expected = order.total,
            received_x100 = callback.amount_x100,
            "vnpay amount mismatch"
        );
        return Ok((IpnOutcome::InvalidAmount, None));
    }

    let payment_status = order.payment_status.parse::<PaymentStatus>()?;
    let status = order.status.parse::<OrderStatus>()?;
    if matches!(payment_status, PaymentStatus::Paid | PaymentStatus::Refunded)
        || status.is_terminal()
    {
        return Ok((IpnOutcome::AlreadyConfirmed, Some(payment_status)));
    }

    let now = Utc::now();
    let order_id = order.id;
    let user_id = order.user_id;
    let mut active: OrderActive = order.into();
    active.payment_reference = Set(callback.transaction_no.clone());
    active.updated_at = Set(now.into());

    let new_status = if callback.is_success() {
        active.payment_status = Set(PaymentStatus::Paid.as_str().into());
        active.paid_at = Set(Some(now.into()));
        let order = active.update(&txn).await?;
        if status == OrderStatus::Pending {
            order_service::transition_order(
                &txn,
                order,
                OrderStatus::Confirmed,
                None,
                Some("Paid via VNPay".into()),
            )
            .await?;
        }
        PaymentStatus::Paid
    } else {
        active.payment_status = Set(PaymentStatus::Failed.as_str().into());
        active.update(&txn).await?;
        PaymentStatus::Failed
    };

    txn.commit().await?;

    tracing::info!(
        %order_id,
        response_code = %callback.response_code,
        payment_status = %new_status,
        "vnpay payment recorded"
    );
    audit::record(
        state,
        Some(user_id),
        "vnpay_callback",
        "orders",
        serde_json::json!({
            "order_id": order_id,
            "response_code": callback.response_code,
            "transaction_no": callback.transaction_no,
            "payment_status": new_status.as_str(),
        }),
    )
    .await;

    Ok((IpnOutcome::Confirmed, Some(new_status)))
}

pub async fn handle_ipn(state: &AppState, params: BTreeMap<String, String>) -> IpnReply {
    let result = apply_callback(state, &params).await;
    tracing::info!(rsp_code = result.outcome.code(), "vnpay ipn answered");
    result.outcome.reply()
}

/// Browser redirect after payment. Applies the same update as the IPN, since
/// the redirect often arrives first.
pub async fn handle_return(
    state: &AppState,
    params: BTreeMap<String, String>,
) -> AppResult<ApiResponse<PaymentReturnResult>> {
    let result = apply_callback(state, &params).await;
    match result.outcome {
        IpnOutcome::InvalidSignature => {
            return Err(AppError::BadRequest("Invalid signature".into()));
        }
        IpnOutcome::OrderNotFound => return Err(AppError::NotFound("Order")),
        IpnOutcome::InvalidAmount => return Err(AppError::BadRequest("Invalid amount".into())),
        IpnOutcome::UnknownError => {
            return Err(AppError::internal("vnpay return could not be processed"));
        }
        IpnOutcome::Confirmed | IpnOutcome::AlreadyConfirmed => {}
    }

    let Some(callback) = result.callback else {
        return Err(AppError::internal("vnpay return without callback"));
    };
    let success = callback.is_success() && result.payment_status == Some(PaymentStatus::Paid);

    Ok(ApiResponse::success(
        if success { "Payment successful" } else { "Payment failed" },
        PaymentReturnResult {
            order_number: callback.txn_ref.clone(),
            success,
            message: describe_response_code(&callback.response_code).to_string(),
            response_code: callback.response_code,
            payment_status: result.payment_status.map(|s| s.as_str().to_string()),
        },
        None,
    ))
}

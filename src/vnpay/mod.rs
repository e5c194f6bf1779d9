//! VNPay payment gateway: outbound payment URLs and inbound return/IPN checks.

pub mod signature;

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::Serialize;
use url::Url;
use utoipa::ToSchema;

use crate::{
    config::{AppEnv, VnpayConfig},
    error::{AppError, AppResult},
};

pub use signature::SignatureCheck;

const VERSION: &str = "2.1.0";
const COMMAND: &str = "pay";
const CURRENCY: &str = "VND";
const ORDER_TYPE: &str = "other";
const DEFAULT_LOCALE: &str = "vn";
const EXPIRE_MINUTES: i64 = 15;
const VN_UTC_OFFSET_SECS: i32 = 7 * 3600;
const TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// VNPay timestamps are `yyyyMMddHHmmss` in GMT+7.
pub fn format_vn_time(at: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(VN_UTC_OFFSET_SECS) {
        Some(offset) => at.with_timezone(&offset).format(TIME_FORMAT).to_string(),
        None => at.format(TIME_FORMAT).to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub txn_ref: String,
    /// Amount in VND; VNPay receives it multiplied by 100.
    pub amount: i64,
    pub order_info: String,
    pub ip_addr: String,
    pub bank_code: Option<String>,
    pub locale: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VnpayGateway {
    tmn_code: String,
    hash_secret: String,
    payment_url: String,
    return_url: String,
    allow_simulated: bool,
}

impl VnpayGateway {
    pub fn new(config: &VnpayConfig, env: AppEnv) -> Self {
        if config.allow_simulated && env.is_production() {
            tracing::warn!("VNPAY_ALLOW_SIMULATED is ignored in production");
        }
        Self {
            tmn_code: config.tmn_code.clone(),
            hash_secret: config.hash_secret.clone(),
            payment_url: config.payment_url.clone(),
            return_url: config.return_url.clone(),
            allow_simulated: config.allow_simulated && !env.is_production(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.tmn_code.is_empty() && !self.hash_secret.is_empty()
    }

    pub fn allows_simulation(&self) -> bool {
        self.allow_simulated
    }

    pub fn payment_params(&self, req: &PaymentRequest) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            params.insert(key.to_string(), value);
        };
        put("vnp_Version", VERSION.into());
        put("vnp_Command", COMMAND.into());
        put("vnp_TmnCode", self.tmn_code.clone());
        put("vnp_Amount", (req.amount * 100).to_string());
        put("vnp_CurrCode", CURRENCY.into());
        put("vnp_TxnRef", req.txn_ref.clone());
        put("vnp_OrderInfo", req.order_info.clone());
        put("vnp_OrderType", ORDER_TYPE.into());
        put(
            "vnp_Locale",
            req.locale
                .clone()
                .filter(|l| l == "vn" || l == "en")
                .unwrap_or_else(|| DEFAULT_LOCALE.into()),
        );
        put("vnp_ReturnUrl", self.return_url.clone());
        put("vnp_IpAddr", req.ip_addr.clone());
        put("vnp_CreateDate", format_vn_time(req.created_at));
        put(
            "vnp_ExpireDate",
            format_vn_time(req.created_at + Duration::minutes(EXPIRE_MINUTES)),
        );
        if let Some(bank) = req.bank_code.as_ref().filter(|b| !b.is_empty()) {
            put("vnp_BankCode", bank.clone());
        }
        params
    }

    /// Signed redirect URL for the VNPay payment page.
    pub fn build_payment_url(&self, req: &PaymentRequest) -> AppResult<String> {
        if !self.is_configured() {
            return Err(AppError::BadRequest("VNPay is not configured".into()));
        }
        if req.amount <= 0 {
            return Err(AppError::BadRequest("Payment amount must be positive".into()));
        }

        let params = self.payment_params(req);
        let secure_hash = signature::sign_params(&self.hash_secret, &params)?;

        let mut url = Url::parse(&self.payment_url)
            .map_err(|e| AppError::internal(format!("invalid VNPAY_URL: {e}")))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter())
            .append_pair(signature::SECURE_HASH, &secure_hash);
        Ok(url.into())
    }

    /// Without a configured secret only simulator hashes can pass.
    pub fn verify(&self, params: &BTreeMap<String, String>) -> SignatureCheck {
        match signature::verify(&self.hash_secret, params, self.allow_simulated) {
            SignatureCheck::Valid if self.hash_secret.is_empty() => SignatureCheck::Invalid,
            check => check,
        }
    }
}

/// Fields of a return/IPN callback that drive the order update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnpayCallback {
    pub txn_ref: String,
    /// `vnp_Amount` as sent, i.e. VND multiplied by 100.
    pub amount_x100: i64,
    pub response_code: String,
    pub transaction_status: Option<String>,
    pub transaction_no: Option<String>,
    pub bank_code: Option<String>,
}

impl VnpayCallback {
    pub fn from_params(params: &BTreeMap<String, String>) -> AppResult<Self> {
        let required = |key: &str| {
            params
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| AppError::BadRequest(format!("missing {key}")))
        };
        let optional = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();

        let amount_x100 = required("vnp_Amount")?
            .parse::<i64>()
            .map_err(|_| AppError::BadRequest("invalid vnp_Amount".into()))?;

        Ok(Self {
            txn_ref: required("vnp_TxnRef")?,
            amount_x100,
            response_code: required("vnp_ResponseCode")?,
            transaction_status: optional("vnp_TransactionStatus"),
            transaction_no: optional("vnp_TransactionNo"),
            bank_code: optional("vnp_BankCode"),
        })
    }

    pub fn is_success(&self) -> bool {
        self.response_code == "00" && self.transaction_status.as_deref() == Some("00")
    }

    pub fn matches_amount(&self, total_vnd: i64) -> bool {
        total_vnd.checked_mul(100) == Some(self.amount_x100)
    }
}

/// Result of applying a callback, mapped onto VNPay's IPN reply codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpnOutcome {
    Confirmed,
    OrderNotFound,
    AlreadyConfirmed,
    InvalidAmount,
    InvalidSignature,
    UnknownError,
}

impl IpnOutcome {
    pub fn code(self) -> &'static str {
        match self {
            IpnOutcome::Confirmed => "00",
            IpnOutcome::OrderNotFound => "01",
            IpnOutcome::AlreadyConfirmed => "02",
            IpnOutcome::InvalidAmount => "04",
            IpnOutcome::InvalidSignature => "97",
            IpnOutcome::UnknownError => "99",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            IpnOutcome::Confirmed => "Confirm Success",
            IpnOutcome::OrderNotFound => "Order not found",
            IpnOutcome::AlreadyConfirmed => "Order already confirmed",
            IpnOutcome::InvalidAmount => "Invalid amount",
            IpnOutcome::InvalidSignature => "Invalid signature",
            IpnOutcome::UnknownError => "Unknown error",
        }
    }

    pub fn reply(self) -> IpnReply {
        IpnReply {
            rsp_code: self.code().to_string(),
            message: self.message().to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IpnReply {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

/// Human readable text for common `vnp_ResponseCode` values.
pub fn describe_response_code(code: &str) -> &'static str {
    match code {
        "00" => "Transaction successful",
        "07" => "Amount deducted, transaction flagged as suspicious",
        "09" => "Card or account is not registered for internet banking",
        "10" => "Card or account verification failed more than 3 times",
        "11" => "Payment window expired",
        "12" => "Card or account is locked",
        "13" => "Incorrect OTP",
        "24" => "Customer cancelled the transaction",
        "51" => "Insufficient balance",
        "65" => "Daily transaction limit exceeded",
        "75" => "Bank is under maintenance",
        "79" => "Incorrect payment password entered too many times",
        _ => "Transaction failed",
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn gateway(allow_simulated: bool, env: AppEnv) -> VnpayGateway {
        VnpayGateway::new(
            &VnpayConfig {
                tmn_code: "COFFEE01".into(),
                hash_secret: "TESTSECRET".into(),
                payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
                return_url: "http://localhost:3000/api/payment/vnpay/return".into(),
                allow_simulated,
            },
            env,
        )
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            txn_ref: "ORD-20261019-1A2B3C4D".into(),
            amount: 159_600,
            order_info: "Thanh toan don hang ORD-20261019-1A2B3C4D".into(),
            ip_addr: "127.0.0.1".into(),
            bank_code: Some("NCB".into()),
            locale: None,
            created_at: Utc.with_ymd_and_hms(2026, 10, 19, 3, 0, 0).unwrap(),
        }
    }

    fn query_params(url: &str) -> BTreeMap<String, String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn times_are_in_vietnam_timezone() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 20, 30, 5).unwrap();
        assert_eq!(format_vn_time(at), "20261020033005");
    }

    #[test]
    fn payment_url_round_trips_through_verification() {
        let gw = gateway(false, AppEnv::Development);
        let url = gw.build_payment_url(&request()).unwrap();
        let params = query_params(&url);

        assert_eq!(params["vnp_Amount"], "15960000");
        assert_eq!(params["vnp_CreateDate"], "20261019100000");
        assert_eq!(params["vnp_ExpireDate"], "20261019101500");
        assert_eq!(params["vnp_Locale"], "vn");
        assert_eq!(params["vnp_BankCode"], "NCB");
        assert_eq!(gw.verify(&params), SignatureCheck::Valid);
    }

    #[test]
    fn tampered_callback_fails() {
        let gw = gateway(false, AppEnv::Development);
        let mut params = query_params(&gw.build_payment_url(&request()).unwrap());
        params.insert("vnp_TxnRef".into(), "ORD-20261019-FFFFFFFF".into());
        assert_eq!(gw.verify(&params), SignatureCheck::Invalid);
    }

    #[test]
    fn simulation_is_disabled_in_production() {
        assert!(gateway(true, AppEnv::Development).allows_simulation());
        assert!(!gateway(true, AppEnv::Production).allows_simulation());
        assert!(!gateway(false, AppEnv::Development).allows_simulation());
    }

    #[test]
    fn unconfigured_gateway_refuses_urls() {
        let gw = VnpayGateway::new(
            &VnpayConfig {
                tmn_code: String::new(),
                hash_secret: String::new(),
                payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
                return_url: String::new(),
                allow_simulated: false,
            },
            AppEnv::Development,
        );
        assert!(gw.build_payment_url(&request()).is_err());

        let mut params = BTreeMap::from([("vnp_TxnRef".to_string(), "ORD-1".to_string())]);
        let forged = signature::sign_params("", &params).unwrap();
        params.insert(signature::SECURE_HASH.into(), forged);
        assert_eq!(gw.verify(&params), SignatureCheck::Invalid);
    }

    #[test]
    fn callback_parsing_and_success() {
        let params: BTreeMap<String, String> = [
            ("vnp_TxnRef", "ORD-1"),
            ("vnp_Amount", "15960000"),
            ("vnp_ResponseCode", "00"),
            ("vnp_TransactionStatus", "00"),
            ("vnp_TransactionNo", "14012345"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let cb = VnpayCallback::from_params(&params).unwrap();
        assert!(cb.is_success());
        assert!(cb.matches_amount(159_600));
        assert!(!cb.matches_amount(159_601));
        assert_eq!(cb.transaction_no.as_deref(), Some("14012345"));

        let mut failed = params.clone();
        failed.insert("vnp_ResponseCode".into(), "24".into());
        assert!(!VnpayCallback::from_params(&failed).unwrap().is_success());

        let mut no_status = params.clone();
        no_status.remove("vnp_TransactionStatus");
        assert!(!VnpayCallback::from_params(&no_status).unwrap().is_success());

        let mut pending = params.clone();
        pending.insert("vnp_TransactionStatus".into(), "01".into());
        assert!(!VnpayCallback::from_params(&pending).unwrap().is_success());

        let mut missing = params;
        missing.remove("vnp_TxnRef");
        assert!(VnpayCallback::from_params(&missing).is_err());
    }

    #[test]
    fn ipn_codes() {
        assert_eq!(IpnOutcome::InvalidSignature.reply().rsp_code, "97");
        assert_eq!(
            serde_json::to_value(IpnOutcome::Confirmed.reply()).unwrap(),
            serde_json::json!({ "RspCode": "00", "Message": "Confirm Success" })
        );
        assert_eq!(describe_response_code("24"), "Customer cancelled the transaction");
    }
}
